//! D-string literal lowering (spec §4.6.1 / §9).
//!
//! `D"count is {c}"` becomes: a private format-string global with each
//! `{name}` placeholder replaced by a `snprintf` conversion specifier, a
//! formatter function specific to that literal (it knows each
//! placeholder's type and count at compile time, so it can build the
//! `snprintf` call with the right argument list), and a call to
//! `DString_create` wiring the formatter and the placeholders' storage
//! addresses together. Re-interpolation on mutation is handled generically
//! by the runtime (`runtime.rs`); only the per-literal render step is
//! specialized here.

use super::state::CodegenState;
use super::Locals;
use crate::error::CodeGenError;
use crate::types::{PrimitiveType, Type};
use regex::Regex;

/// Lowers a D-string literal's raw template text, returning the SSA
/// register holding the resulting `%struct.DString*`.
pub fn lower_dstring_literal(
    state: &mut CodegenState,
    locals: &Locals,
    _class_ctx: Option<&str>,
    template: &str,
) -> Result<String, CodeGenError> {
    let placeholder = Regex::new(r"\{(\w+)\}").map_err(|e| CodeGenError::Logic(e.to_string()))?;

    let mut names = Vec::new();
    let mut fmt_text = String::new();
    let mut last = 0;
    for caps in placeholder.captures_iter(template) {
        let m = caps.get(0).unwrap();
        fmt_text.push_str(&escape_percent(&template[last..m.start()]));
        let name = caps.get(1).unwrap().as_str().to_string();
        let Some((_, ty)) = locals.get(&name) else {
            return Err(CodeGenError::Logic(format!(
                "D-string placeholder '{{{}}}' does not name a variable in scope",
                name
            )));
        };
        let ty = ty.clone();
        fmt_text.push_str(conversion_spec(&ty));
        names.push((name, ty));
        last = m.end();
    }
    fmt_text.push_str(&escape_percent(&template[last..]));

    let id = state.fresh_dstring_id();
    let fmt_global = format!("@.dstr.fmt.{}.tmpl", id);
    let formatter = format!("@.dstr.fmt.{}", id);
    emit_format_global(state, &fmt_global, &fmt_text);
    emit_formatter_function(state, &formatter, &fmt_global, &names);

    let count = names.len();
    let vars_bytes = (count.max(1) * 8) as u64;
    let vars_reg = state.fresh_temp();
    state.emit(format!("  {} = call ptr @malloc(i64 {})", vars_reg, vars_bytes));
    for (i, (name, _ty)) in names.iter().enumerate() {
        let Some((addr, _)) = locals.get(name) else {
            return Err(CodeGenError::Logic(format!("Unknown D-string placeholder '{}'", name)));
        };
        let slot = state.fresh_temp();
        state.emit(format!("  {} = getelementptr ptr, ptr {}, i32 {}", slot, vars_reg, i));
        state.emit(format!("  store ptr {}, ptr {}", addr, slot));
    }

    let dstring_reg = state.fresh_temp();
    state.emit(format!(
        "  {} = call ptr @DString_create(ptr {}, ptr {}, i32 {})",
        dstring_reg, formatter, vars_reg, count
    ));
    for (name, _) in &names {
        state.track_dependency(name, &dstring_reg);
    }
    Ok(dstring_reg)
}

fn conversion_spec(ty: &Type) -> &'static str {
    match ty {
        Type::Primitive(PrimitiveType::Boolean) => "%s",
        Type::Primitive(p) if p.is_float() => "%f",
        Type::Primitive(_) => "%d",
        Type::Str | Type::DStr => "%s",
        _ => "%p",
    }
}

fn escape_percent(text: &str) -> String {
    text.replace('%', "%%")
}

fn emit_format_global(state: &mut CodegenState, name: &str, text: &str) {
    let (escaped, len) = escape_c_string(text);
    state.emit(format!(
        "{} = private unnamed_addr constant [{} x i8] c\"{}\"",
        name, len, escaped
    ));
}

/// Escapes a Rust string into LLVM's `c"..."` constant syntax, returning
/// the escaped text and the byte length including the trailing NUL.
fn escape_c_string(text: &str) -> (String, usize) {
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

/// Emits the per-literal formatter: loads each placeholder's value out of
/// the `DString`'s tracked variable-pointer array, converts booleans to
/// `"true"`/`"false"`, computes the needed buffer size with a
/// length-probing `snprintf`, then renders into a freshly malloc'd buffer.
fn emit_formatter_function(
    state: &mut CodegenState,
    name: &str,
    fmt_global: &str,
    placeholders: &[(String, Type)],
) {
    state.emit(format!("define ptr {}(ptr %d) {{", name));
    state.emit("entry:");
    state.emit("  %vars_slot = getelementptr %struct.DString, ptr %d, i32 0, i32 2");
    state.emit("  %vars = load ptr, ptr %vars_slot");

    let mut arg_list = Vec::new();
    for (i, (_, ty)) in placeholders.iter().enumerate() {
        let slot = state.fresh_temp();
        let addr = state.fresh_temp();
        state.emit(format!("  {} = getelementptr ptr, ptr %vars, i32 {}", slot, i));
        state.emit(format!("  {} = load ptr, ptr {}", addr, slot));
        let llvm_ty = ty.llvm_ir();
        let raw = state.fresh_temp();
        state.emit(format!("  {} = load {}, ptr {}", raw, llvm_ty, addr));
        if matches!(ty, Type::Primitive(PrimitiveType::Boolean)) {
            let as_str = state.fresh_temp();
            state.emit(format!(
                "  {} = select i1 {}, ptr @.str.bool.true, ptr @.str.bool.false",
                as_str, raw
            ));
            arg_list.push(format!("ptr {}", as_str));
        } else {
            arg_list.push(format!("{} {}", llvm_ty, raw));
        }
    }
    let args_suffix = if arg_list.is_empty() {
        String::new()
    } else {
        format!(", {}", arg_list.join(", "))
    };

    let need = state.fresh_temp();
    state.emit(format!(
        "  {} = call i32 (ptr, i64, ptr, ...) @snprintf(ptr null, i64 0, ptr {}{})",
        need, fmt_global, args_suffix
    ));
    let need64 = state.fresh_temp();
    state.emit(format!("  {} = sext i32 {} to i64", need64, need));
    let total = state.fresh_temp();
    state.emit(format!("  {} = add i64 {}, 1", total, need64));
    let buf = state.fresh_temp();
    state.emit(format!("  {} = call ptr @malloc(i64 {})", buf, total));
    state.emit(format!(
        "  call i32 (ptr, i64, ptr, ...) @snprintf(ptr {}, i64 {}, ptr {}{})",
        buf, total, fmt_global, args_suffix
    ));
    state.emit(format!("  ret ptr {}", buf));
    state.emit("}");
    state.emit("");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::SymbolTable;
    use crate::types::TypeRegistry;
    use std::collections::HashMap;

    #[test]
    fn lowers_a_single_placeholder_template() {
        let registry = TypeRegistry::new();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let mut locals: Locals = HashMap::new();
        locals.insert("c".to_string(), ("%c.addr".to_string(), Type::Primitive(PrimitiveType::Int)));
        let reg = lower_dstring_literal(&mut state, &locals, None, "count is {c}").unwrap();
        assert!(reg.starts_with('%'));
        assert!(state.out.contains("DString_create"));
        assert!(state.out.contains("%%d") == false);
        assert!(state.out.contains("count is %d"));
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let registry = TypeRegistry::new();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let locals: Locals = HashMap::new();
        let err = lower_dstring_literal(&mut state, &locals, None, "{missing}").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
