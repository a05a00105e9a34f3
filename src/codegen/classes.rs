//! Struct/vtable/constructor/destructor emission (spec §4.6).
//!
//! One class's full runtime shape: `%class.<Name>` (vtable slot followed by
//! fields in declaration order, matching `ClassType`'s layout), `@vtable.<Name>`
//! (a constant function-pointer table filled from `ClassType::vtable`,
//! which already carries inherited slots verbatim), `@<Name>_new` (malloc +
//! vtable store + per-field initialization), and `@<Name>_clean_impl`
//! (null-checked frees of every pointer-typed field, then the struct
//! itself). `.clean()` lowers to a call to the latter (`expr.rs`).

use super::dstring::lower_dstring_literal;
use super::expr::lower_expr;
use super::state::CodegenState;
use super::Locals;
use crate::error::CodeGenError;
use crate::types::{ClassType, Type};
use std::collections::HashMap;

pub fn emit_class(state: &mut CodegenState, class: &ClassType) -> Result<(), CodeGenError> {
    emit_struct_type(state, class);
    emit_vtable(state, class);
    emit_constructor(state, class)?;
    emit_destructor(state, class);
    Ok(())
}

fn emit_struct_type(state: &mut CodegenState, class: &ClassType) {
    let mut field_tys: Vec<String> = vec!["ptr".to_string()];
    field_tys.extend(class.fields.iter().map(|f| f.field_type.llvm_ir()));
    state.emit(format!(
        "%class.{} = type {{ {} }}",
        class.name,
        field_tys.join(", ")
    ));
}

fn emit_vtable(state: &mut CodegenState, class: &ClassType) {
    if class.vtable.is_empty() {
        return;
    }
    let slot_tys = vec!["ptr"; class.vtable.len()].join(", ");
    state.emit(format!("%vtable.{} = type {{ {} }}", class.name, slot_tys));

    let entries: Vec<String> = class
        .vtable
        .iter()
        .map(|slot| {
            let owner_method = state
                .registry
                .resolve_method(&slot.owner_class, &slot.method_name)
                .expect("vtable slot names a method that exists on its owner class");
            format!("ptr @{}", owner_method.symbol())
        })
        .collect();
    state.emit(format!(
        "@vtable.{} = global %vtable.{} {{ {} }}",
        class.name,
        class.name,
        entries.join(", ")
    ));
}

fn emit_constructor(state: &mut CodegenState, class: &ClassType) -> Result<(), CodeGenError> {
    state.begin_function();
    state.emit(format!("define ptr @{}_new() {{", class.name));
    state.emit("entry:");
    let obj = state.fresh_temp();
    state.emit(format!("  {} = call ptr @malloc(i64 {})", obj, class.struct_size));

    if !class.vtable.is_empty() {
        let slot = state.fresh_temp();
        state.emit(format!(
            "  {} = getelementptr %class.{}, ptr {}, i32 0, i32 0",
            slot, class.name, obj
        ));
        state.emit(format!("  store ptr @vtable.{}, ptr {}", class.name, slot));
    }

    let locals: Locals = HashMap::new();
    for (i, field) in class.fields.iter().enumerate() {
        let slot = state.fresh_temp();
        state.emit(format!(
            "  {} = getelementptr %class.{}, ptr {}, i32 0, i32 {}",
            slot,
            class.name,
            obj,
            i + 1
        ));
        let value = match &field.initializer {
            Some(expr) => lower_expr(state, &locals, None, expr)?,
            None => zero_value(&field.field_type),
        };
        state.emit(format!(
            "  store {} {}, ptr {}",
            field.field_type.llvm_ir(),
            value,
            slot
        ));
    }

    state.emit(format!("  ret ptr {}", obj));
    state.emit("}");
    state.emit("");
    Ok(())
}

fn emit_destructor(state: &mut CodegenState, class: &ClassType) {
    state.emit(format!("define void @{}_clean_impl(ptr %self) {{", class.name));
    state.emit("entry:");
    for (i, field) in class.fields.iter().enumerate() {
        if !is_heap_owned(&field.field_type) {
            continue;
        }
        let slot = state.fresh_temp();
        state.emit(format!(
            "  {} = getelementptr %class.{}, ptr %self, i32 0, i32 {}",
            slot,
            class.name,
            i + 1
        ));
        let value = state.fresh_temp();
        state.emit(format!("  {} = load ptr, ptr {}", value, slot));
        let is_null = state.fresh_temp();
        state.emit(format!("  {} = icmp eq ptr {}, null", is_null, value));
        let free_label = state.fresh_label("field.free");
        let skip_label = state.fresh_label("field.skip");
        state.emit(format!("  br i1 {}, label {}, label {}", is_null, as_label(&skip_label), as_label(&free_label)));
        state.emit(format!("{}:", free_label));
        state.emit(format!("  call void @free(ptr {})", value));
        state.emit(format!("  br label {}", as_label(&skip_label)));
        state.emit(format!("{}:", skip_label));
    }
    state.emit("  call void @free(ptr %self)");
    state.emit("  ret void");
    state.emit("}");
    state.emit("");
}

fn as_label(name: &str) -> String {
    format!("%{}", name)
}

fn is_heap_owned(ty: &Type) -> bool {
    matches!(ty, Type::Pointer(_) | Type::Str | Type::DStr | Type::Array(_, _))
}

fn zero_value(ty: &Type) -> String {
    match ty {
        Type::Primitive(p) if p.is_float() => "0.0".to_string(),
        Type::Primitive(_) => "0".to_string(),
        _ => "null".to_string(),
    }
}

/// Lowers a D-string field initializer the same way an expression context
/// would; kept here because `classes.rs` is the only caller that needs a
/// field initializer evaluated with no enclosing locals.
#[allow(dead_code)]
fn lower_field_dstring(state: &mut CodegenState, template: &str) -> Result<String, CodeGenError> {
    let locals: Locals = HashMap::new();
    lower_dstring_literal(state, &locals, None, template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::SymbolTable;
    use crate::types::{FieldInfo, PrimitiveType, TypeRegistry, VtableSlot};
    use crate::ast::{FieldAttributes, Visibility};

    #[test]
    fn struct_type_has_vtable_slot_plus_fields() {
        let registry = TypeRegistry::new();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let mut class = ClassType::new("Hospital");
        class.add_field(
            FieldInfo {
                name: "n".to_string(),
                field_type: Type::Primitive(PrimitiveType::Int),
                offset: 0,
                is_const: false,
                visibility: Visibility::Public,
                attributes: FieldAttributes::default(),
                initializer: None,
            },
            &registry,
        );
        emit_struct_type(&mut state, &class);
        assert!(state.out.contains("%class.Hospital = type { ptr, i32 }"));
    }

    #[test]
    fn vtable_lists_owner_symbols_in_slot_order() {
        let mut registry = TypeRegistry::new();
        let mut a = ClassType::new("A");
        a.methods.push(crate::types::MethodInfo {
            name: "f".to_string(),
            owner_class: "A".to_string(),
            return_type: Type::Primitive(PrimitiveType::Int),
            param_types: vec![],
            param_names: vec![],
            is_static: false,
            visibility: Visibility::Public,
            vtable_index: 0,
        });
        a.vtable.push(VtableSlot {
            method_name: "f".to_string(),
            owner_class: "A".to_string(),
        });
        registry.register_class(a).unwrap();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let class = registry.get_class("A").unwrap();
        emit_vtable(&mut state, class);
        assert!(state.out.contains("@vtable.A = global %vtable.A { ptr @A_f }"));
    }
}
