//! LLVM IR code generation (spec §4.6).
//!
//! Orchestrates the whole-module emission: runtime preamble, the regular
//! string pool, every class's struct/vtable/constructor/destructor
//! (`classes.rs`), and every function/method body (`stmt.rs`/`expr.rs`
//! for the statement and expression lowering, `dstring.rs` for D-string
//! literals). Input is already fully type-checked (`analyzer.rs`) and
//! cleanup-validated (`pointer_lint.rs`) by the time this module runs —
//! codegen itself never rejects a program, it only has internal
//! consistency errors (`CodeGenError::Logic`) for invariants the earlier
//! passes are supposed to have already enforced.

mod classes;
mod dstring;
mod expr;
mod runtime;
mod state;
mod stmt;

use crate::ast::{ClassDeclaration, ClassMember, Declaration, FunctionDeclaration, MethodDeclaration, Program, TypeName};
use crate::error::CodeGenError;
use crate::symtab::SymbolTable;
use crate::types::{FunctionSignature, PrimitiveType, Type, TypeRegistry};
use state::CodegenState;
use std::collections::HashMap;

/// Maps a binding visible in the current lowering context (local,
/// parameter, or synthesized loop variable) to its storage address and
/// resolved type.
pub type Locals = HashMap<String, (String, Type)>;

pub fn generate(registry: &TypeRegistry, symbols: SymbolTable, program: &Program) -> Result<String, CodeGenError> {
    let mut state = CodegenState::new(registry, symbols);

    state.emit(runtime::preamble());
    state.emit(runtime::bool_string_globals());
    state.emit(runtime::dstring_runtime());

    for (i, value) in state.symbols.string_pool().to_vec().iter().enumerate() {
        let (escaped, len) = dstring_escape(value);
        state.emit(format!(
            "@.str.{} = private unnamed_addr constant [{} x i8] c\"{}\"",
            i, len, escaped
        ));
    }
    state.emit("");

    for class in registry.classes_in_order() {
        classes::emit_class(&mut state, class)?;
    }

    for decl in &program.declarations {
        match decl {
            Declaration::Class(cd) => emit_class_bodies(&mut state, cd)?,
            Declaration::Function(fd) => emit_function(&mut state, fd)?,
            Declaration::Interface(_) => {}
        }
    }

    Ok(state.out)
}

fn dstring_escape(text: &str) -> (String, usize) {
    let mut escaped = String::new();
    let mut len = 0;
    for byte in text.bytes() {
        len += 1;
        match byte {
            b' '..=b'~' if byte != b'"' && byte != b'\\' => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{:02X}", byte)),
        }
    }
    escaped.push_str("\\00");
    len += 1;
    (escaped, len)
}

fn emit_class_bodies(state: &mut CodegenState, cd: &ClassDeclaration) -> Result<(), CodeGenError> {
    emit_members(state, &cd.name, &cd.members)
}

fn emit_members(state: &mut CodegenState, class_name: &str, members: &[ClassMember]) -> Result<(), CodeGenError> {
    for member in members {
        match member {
            ClassMember::Method(m) => emit_method(state, class_name, m)?,
            ClassMember::Field(_) => {}
            ClassMember::Scope(_, nested) => emit_members(state, class_name, nested)?,
        }
    }
    Ok(())
}

fn emit_method(state: &mut CodegenState, class_name: &str, method: &MethodDeclaration) -> Result<(), CodeGenError> {
    state.begin_function();
    let mut locals: Locals = HashMap::new();

    let mut params = Vec::new();
    if !method.is_static {
        params.push("ptr %this".to_string());
        locals.insert("this".to_string(), ("%this.addr".to_string(), Type::pointer_to(Type::Class(class_name.to_string()))));
    }
    for p in &method.params {
        let ty = resolve_type_name(state.registry, &p.type_name);
        params.push(format!("{} %{}.in", ty.llvm_ir(), p.name));
        locals.insert(p.name.clone(), (format!("%{}.addr", p.name), ty));
    }

    let return_type = resolve_type_name(state.registry, &method.return_type);
    state.emit(format!(
        "define {} @{}_{}({}) {{",
        return_type.llvm_ir(), class_name, method.name, params.join(", ")
    ));
    state.emit("entry:");

    if !method.is_static {
        state.emit("  %this.addr = alloca ptr");
        state.emit("  store ptr %this, ptr %this.addr");
    }
    for p in &method.params {
        let (_, ty) = &locals[&p.name];
        state.emit(format!("  %{}.addr = alloca {}", p.name, ty.llvm_ir()));
        state.emit(format!("  store {} %{}.in, ptr %{}.addr", ty.llvm_ir(), p.name, p.name));
    }

    stmt::lower_body(state, &mut locals, Some(class_name), &method.body, &return_type)?;
    state.emit("}");
    state.emit("");
    Ok(())
}

fn emit_function(state: &mut CodegenState, fd: &FunctionDeclaration) -> Result<(), CodeGenError> {
    state.begin_function();
    let mut locals: Locals = HashMap::new();

    let mut params = Vec::new();
    let mut param_types = Vec::new();
    for p in &fd.params {
        let ty = resolve_type_name(state.registry, &p.type_name);
        params.push(format!("{} %{}.in", ty.llvm_ir(), p.name));
        param_types.push(ty.clone());
        locals.insert(p.name.clone(), (format!("%{}.addr", p.name), ty));
    }

    let return_type = resolve_type_name(state.registry, &fd.return_type);
    // Register the function's own signature so calls to it from sibling
    // functions resolve through `Locals` the same way a parameter would
    // (mutual recursion is allowed; spec §4.4 pre-registers all functions
    // before analyzing bodies).
    locals.insert(
        fd.name.clone(),
        (
            format!("@{}", fd.name),
            Type::Function(Box::new(FunctionSignature { params: param_types, return_type: return_type.clone() })),
        ),
    );

    state.emit(format!("define {} @{}({}) {{", return_type.llvm_ir(), fd.name, params.join(", ")));
    state.emit("entry:");
    for p in &fd.params {
        let (_, ty) = &locals[&p.name];
        state.emit(format!("  %{}.addr = alloca {}", p.name, ty.llvm_ir()));
        state.emit(format!("  store {} %{}.in, ptr %{}.addr", ty.llvm_ir(), p.name, p.name));
    }

    stmt::lower_body(state, &mut locals, None, &fd.body, &return_type)?;
    state.emit("}");
    state.emit("");
    Ok(())
}

/// Resolves a parsed `TypeName` to a `Type`, assuming it already passed
/// semantic analysis (an unknown base name here would be an analyzer bug,
/// not a program error codegen needs to report).
fn resolve_type_name(registry: &TypeRegistry, tn: &TypeName) -> Type {
    let mut base = if let Some(p) = PrimitiveType::from_name(&tn.base) {
        Type::Primitive(p)
    } else {
        match tn.base.as_str() {
            "void" => Type::Void,
            "str" => Type::Str,
            "d_str" => Type::DStr,
            _ if registry.has_class(&tn.base) => Type::Class(tn.base.clone()),
            _ => Type::Void,
        }
    };
    for _ in 0..tn.pointer_depth {
        base = Type::pointer_to(base);
    }
    if let Some(size) = tn.array {
        base = Type::Array(Box::new(base), size);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, Param, Statement, TypeName};
    use crate::error::Position;

    fn pos() -> Position {
        Position::new(1, 1)
    }

    #[test]
    fn empty_program_emits_preamble_and_runtime() {
        let registry = TypeRegistry::new();
        let program = Program { declarations: vec![] };
        let ir = generate(&registry, SymbolTable::new(), &program).unwrap();
        assert!(ir.contains("target triple"));
        assert!(ir.contains("DString_create"));
    }

    #[test]
    fn function_with_no_body_statements_gets_a_synthesized_return() {
        let registry = TypeRegistry::new();
        let fd = FunctionDeclaration {
            name: "noop".to_string(),
            params: vec![],
            return_type: TypeName::simple("void"),
            body: Block { statements: vec![] },
            at: pos(),
        };
        let program = Program { declarations: vec![Declaration::Function(fd)] };
        let ir = generate(&registry, SymbolTable::new(), &program).unwrap();
        assert!(ir.contains("define void @noop()"));
        assert!(ir.contains("ret void"));
    }

    #[test]
    fn function_with_int_param_allocas_and_stores_it() {
        let registry = TypeRegistry::new();
        let fd = FunctionDeclaration {
            name: "identity".to_string(),
            params: vec![Param { name: "x".to_string(), type_name: TypeName::simple("int") }],
            return_type: TypeName::simple("int"),
            body: Block {
                statements: vec![Statement::Return {
                    value: Some(crate::ast::Expr::Identifier { name: "x".to_string(), at: pos() }),
                    at: pos(),
                }],
            },
            at: pos(),
        };
        let program = Program { declarations: vec![Declaration::Function(fd)] };
        let ir = generate(&registry, SymbolTable::new(), &program).unwrap();
        assert!(ir.contains("define i32 @identity(i32 %x.in)"));
        assert!(ir.contains("store i32 %x.in, ptr %x.addr"));
    }
}
