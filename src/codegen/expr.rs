//! Expression lowering (spec §4.6).
//!
//! `lower_expr` produces the SSA register (or immediate) holding an
//! expression's *value*. `lower_lvalue` produces the address an
//! assignment writes through, for the handful of expression forms that
//! can appear on the left of `=` (identifiers, field access, array
//! indexing). Both take the same `Locals` map: a local/parameter/field
//! name resolves to its stack-slot address and resolved type.

use super::dstring::lower_dstring_literal;
use super::state::CodegenState;
use super::Locals;
use crate::ast::{BinaryOp, Expr, LiteralValue, UnaryOp};
use crate::error::CodeGenError;
use crate::types::{PrimitiveType, Type};

/// Lowers an expression to the SSA register holding its value, alongside
/// the type that register holds.
pub fn lower_expr(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    expr: &Expr,
) -> Result<String, CodeGenError> {
    Ok(lower_typed(state, locals, class_ctx, expr)?.0)
}

pub fn lower_typed(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    expr: &Expr,
) -> Result<(String, Type), CodeGenError> {
    match expr {
        Expr::Literal { value, .. } => lower_literal(state, locals, class_ctx, value),
        Expr::Identifier { name, .. } => lower_identifier(state, locals, class_ctx, name),
        Expr::Binary { op, left, right, .. } => lower_binary(state, locals, class_ctx, *op, left, right),
        Expr::Unary { op, operand, .. } => lower_unary(state, locals, class_ctx, *op, operand),
        Expr::MemberAccess { object, member, .. } => {
            lower_member_access(state, locals, class_ctx, object, member)
        }
        Expr::MethodCall { callee, args, .. } => lower_method_call(state, locals, class_ctx, callee, args),
        Expr::New { class_name, args, .. } => lower_new(state, locals, class_ctx, class_name, args),
        Expr::ArrayLiteral { elements, .. } => lower_array_literal(state, locals, class_ctx, elements),
        Expr::ArrayAccess { array, index, .. } => lower_array_access(state, locals, class_ctx, array, index),
    }
}

fn lower_literal(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    value: &LiteralValue,
) -> Result<(String, Type), CodeGenError> {
    match value {
        LiteralValue::Integer(n) => Ok((n.to_string(), Type::Primitive(PrimitiveType::Int))),
        LiteralValue::Float(f) => Ok((format!("{:?}", f), Type::Primitive(PrimitiveType::Double))),
        LiteralValue::Boolean(b) => Ok(((*b as u8).to_string(), Type::Primitive(PrimitiveType::Boolean))),
        LiteralValue::Null => Ok(("null".to_string(), Type::Null)),
        LiteralValue::String(s) => {
            let idx = state.symbols.intern_string(s);
            Ok((format!("@.str.{}", idx), Type::Str))
        }
        LiteralValue::DString(template) => {
            let reg = lower_dstring_literal(state, locals, class_ctx, template)?;
            Ok((reg, Type::DStr))
        }
    }
}

fn lower_identifier(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    name: &str,
) -> Result<(String, Type), CodeGenError> {
    if let Some((addr, ty)) = locals.get(name) {
        let reg = state.fresh_temp();
        state.emit(format!("  {} = load {}, ptr {}", reg, ty.llvm_ir(), addr));
        return Ok((reg, ty.clone()));
    }
    // Implicit-`this` field reference (spec §4.4 identifier resolution rule).
    if let Some(class_name) = class_ctx {
        if let Some(field) = state.registry.resolve_field(class_name, name) {
            let field = field.clone();
            let (this_addr, _) = locals
                .get("this")
                .ok_or_else(|| CodeGenError::Logic(format!("'{}' used outside of a method body", name)))?
                .clone();
            let idx = field_index(state, class_name, name)?;
            let slot = state.fresh_temp();
            state.emit(format!(
                "  {} = getelementptr %class.{}, ptr {}, i32 0, i32 {}",
                slot, class_name, this_addr, idx
            ));
            let reg = state.fresh_temp();
            state.emit(format!("  {} = load {}, ptr {}", reg, field.field_type.llvm_ir(), slot));
            return Ok((reg, field.field_type));
        }
    }
    Err(CodeGenError::Logic(format!("Unresolved identifier '{}'", name)))
}

/// Finds a field's struct-slot index (1 + position, slot 0 is the vtable
/// pointer), walking the parent chain the same way `resolve_field` does.
fn field_index(state: &CodegenState, class_name: &str, field_name: &str) -> Result<usize, CodeGenError> {
    let mut current = Some(class_name.to_string());
    while let Some(name) = current {
        let class = state
            .registry
            .get_class(&name)
            .ok_or_else(|| CodeGenError::Logic(format!("Unknown class '{}'", name)))?;
        if let Some(pos) = class.fields.iter().position(|f| f.name == field_name) {
            return Ok(pos + 1);
        }
        current = class.parent.clone();
    }
    Err(CodeGenError::Logic(format!(
        "'{}' has no field '{}'",
        class_name, field_name
    )))
}

/// Resolves an lvalue expression to its storage address and static type.
pub fn lower_lvalue(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    expr: &Expr,
) -> Result<(String, Type), CodeGenError> {
    match expr {
        Expr::Identifier { name, .. } => {
            if let Some((addr, ty)) = locals.get(name) {
                return Ok((addr.clone(), ty.clone()));
            }
            if let Some(class_name) = class_ctx {
                if let Some(field) = state.registry.resolve_field(class_name, name) {
                    let field = field.clone();
                    let (this_addr, _) = locals
                        .get("this")
                        .ok_or_else(|| CodeGenError::Logic("field assignment outside a method body".to_string()))?
                        .clone();
                    let idx = field_index(state, class_name, name)?;
                    let slot = state.fresh_temp();
                    state.emit(format!(
                        "  {} = getelementptr %class.{}, ptr {}, i32 0, i32 {}",
                        slot, class_name, this_addr, idx
                    ));
                    return Ok((slot, field.field_type));
                }
            }
            Err(CodeGenError::Logic(format!("Unresolved identifier '{}'", name)))
        }
        Expr::MemberAccess { object, member, .. } => {
            let (obj_reg, obj_ty) = lower_typed(state, locals, class_ctx, object)?;
            let class_name = class_name_of(&obj_ty)?;
            let field = state
                .registry
                .resolve_field(&class_name, member)
                .ok_or_else(|| CodeGenError::Logic(format!("'{}' has no field '{}'", class_name, member)))?
                .clone();
            let idx = field_index(state, &class_name, member)?;
            let slot = state.fresh_temp();
            state.emit(format!(
                "  {} = getelementptr %class.{}, ptr {}, i32 0, i32 {}",
                slot, class_name, obj_reg, idx
            ));
            Ok((slot, field.field_type))
        }
        Expr::Unary { op: UnaryOp::Deref, operand, .. } => {
            let (reg, ty) = lower_typed(state, locals, class_ctx, operand)?;
            let pointee = ty
                .pointee()
                .cloned()
                .ok_or_else(|| CodeGenError::Logic("dereferenced a non-pointer value".to_string()))?;
            Ok((reg, pointee))
        }
        Expr::ArrayAccess { array, index, .. } => {
            let (arr_reg, arr_ty) = lower_typed(state, locals, class_ctx, array)?;
            let elem_ty = match &arr_ty {
                Type::Array(inner, _) => (**inner).clone(),
                _ => return Err(CodeGenError::Logic("indexed a non-array value".to_string())),
            };
            let (idx_reg, _) = lower_typed(state, locals, class_ctx, index)?;
            let slot = state.fresh_temp();
            state.emit(format!(
                "  {} = getelementptr {}, ptr {}, i32 {}",
                slot, elem_ty.llvm_ir(), arr_reg, idx_reg
            ));
            Ok((slot, elem_ty))
        }
        _ => Err(CodeGenError::Logic("expression is not assignable".to_string())),
    }
}

fn class_name_of(ty: &Type) -> Result<String, CodeGenError> {
    match ty {
        Type::Class(name) => Ok(name.clone()),
        Type::Pointer(inner) => class_name_of(inner),
        _ => Err(CodeGenError::Logic(format!("'{}' is not a class type", ty.name()))),
    }
}

fn lower_binary(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
) -> Result<(String, Type), CodeGenError> {
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        return lower_short_circuit(state, locals, class_ctx, op, left, right);
    }

    let (l_reg, l_ty) = lower_typed(state, locals, class_ctx, left)?;
    let (r_reg, r_ty) = lower_typed(state, locals, class_ctx, right)?;

    if matches!(op, BinaryOp::Add) && (matches!(l_ty, Type::Str | Type::DStr) || matches!(r_ty, Type::Str | Type::DStr)) {
        return Ok((concat_strings(state, &l_reg, &l_ty, &r_reg, &r_ty)?, Type::Str));
    }

    let result_ty = widen(&l_ty, &r_ty);
    let l_cast = cast_to(state, &l_reg, &l_ty, &result_ty);
    let r_cast = cast_to(state, &r_reg, &r_ty, &result_ty);
    let is_float = result_ty.as_primitive().map(|p| p.is_float()).unwrap_or(false);

    if matches!(op, BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq) {
        let cmp = comparison_mnemonic(op, is_float);
        let reg = state.fresh_temp();
        let instr = if is_float { "fcmp" } else { "icmp" };
        state.emit(format!(
            "  {} = {} {} {} {}, {}",
            reg, instr, cmp, result_ty.llvm_ir(), l_cast, r_cast
        ));
        return Ok((reg, Type::Primitive(PrimitiveType::Boolean)));
    }

    let mnemonic = arithmetic_mnemonic(op, is_float);
    let reg = state.fresh_temp();
    state.emit(format!(
        "  {} = {} {} {}, {}",
        reg, mnemonic, result_ty.llvm_ir(), l_cast, r_cast
    ));
    Ok((reg, result_ty))
}

fn lower_short_circuit(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
) -> Result<(String, Type), CodeGenError> {
    let (l_reg, _) = lower_typed(state, locals, class_ctx, left)?;
    let rhs_label = state.fresh_label(if op == BinaryOp::And { "and.rhs" } else { "or.rhs" });
    let short_label = state.fresh_label(if op == BinaryOp::And { "and.short" } else { "or.short" });
    let end_label = state.fresh_label(if op == BinaryOp::And { "and.end" } else { "or.end" });

    if op == BinaryOp::And {
        state.emit(format!("  br i1 {}, label %{}, label %{}", l_reg, rhs_label, short_label));
    } else {
        state.emit(format!("  br i1 {}, label %{}, label %{}", l_reg, short_label, rhs_label));
    }

    state.emit(format!("{}:", rhs_label));
    let (r_reg, _) = lower_typed(state, locals, class_ctx, right)?;
    state.emit(format!("  br label %{}", end_label));

    state.emit(format!("{}:", short_label));
    state.emit(format!("  br label %{}", end_label));

    state.emit(format!("{}:", end_label));
    let reg = state.fresh_temp();
    let short_value = if op == BinaryOp::And { "false" } else { "true" };
    state.emit(format!(
        "  {} = phi i1 [ {}, %{} ], [ {}, %{} ]",
        reg, r_reg, rhs_label, short_value, short_label
    ));
    Ok((reg, Type::Primitive(PrimitiveType::Boolean)))
}

fn concat_strings(
    state: &mut CodegenState,
    l_reg: &str,
    l_ty: &Type,
    r_reg: &str,
    r_ty: &Type,
) -> Result<String, CodeGenError> {
    let l_str = as_c_string(state, l_reg, l_ty);
    let r_str = as_c_string(state, r_reg, r_ty);
    let l_len = state.fresh_temp();
    state.emit(format!("  {} = call i64 @strlen(ptr {})", l_len, l_str));
    let r_len = state.fresh_temp();
    state.emit(format!("  {} = call i64 @strlen(ptr {})", r_len, r_str));
    let sum = state.fresh_temp();
    state.emit(format!("  {} = add i64 {}, {}", sum, l_len, r_len));
    let total = state.fresh_temp();
    state.emit(format!("  {} = add i64 {}, 1", total, sum));
    let buf = state.fresh_temp();
    state.emit(format!("  {} = call ptr @malloc(i64 {})", buf, total));
    state.emit(format!("  call ptr @strcpy(ptr {}, ptr {})", buf, l_str));
    state.emit(format!("  call ptr @strcat(ptr {}, ptr {})", buf, r_str));
    Ok(buf)
}

fn as_c_string(state: &mut CodegenState, reg: &str, ty: &Type) -> String {
    if matches!(ty, Type::DStr) {
        let out = state.fresh_temp();
        state.emit(format!("  {} = call ptr @DString_get(ptr {})", out, reg));
        out
    } else {
        reg.to_string()
    }
}

fn widen(a: &Type, b: &Type) -> Type {
    match (a.as_primitive(), b.as_primitive()) {
        (Some(pa), Some(pb)) if pa != PrimitiveType::Boolean && pb != PrimitiveType::Boolean => {
            if pa.rank() >= pb.rank() {
                Type::Primitive(pa)
            } else {
                Type::Primitive(pb)
            }
        }
        _ => a.clone(),
    }
}

fn cast_to(state: &mut CodegenState, reg: &str, from: &Type, to: &Type) -> String {
    if from == to {
        return reg.to_string();
    }
    let (Some(fp), Some(tp)) = (from.as_primitive(), to.as_primitive()) else {
        return reg.to_string();
    };
    let out = state.fresh_temp();
    let instr = match (fp.is_float(), tp.is_float()) {
        (false, true) => "sitofp",
        (true, false) => "fptosi",
        (false, false) if tp.rank() > fp.rank() => "sext",
        (false, false) => "trunc",
        (true, true) if tp.rank() > fp.rank() => "fpext",
        (true, true) => "fptrunc",
    };
    state.emit(format!("  {} = {} {} {} to {}", out, instr, from.llvm_ir(), reg, to.llvm_ir()));
    out
}

fn comparison_mnemonic(op: BinaryOp, is_float: bool) -> &'static str {
    match (op, is_float) {
        (BinaryOp::Eq, false) => "eq",
        (BinaryOp::NotEq, false) => "ne",
        (BinaryOp::Lt, false) => "slt",
        (BinaryOp::Gt, false) => "sgt",
        (BinaryOp::LtEq, false) => "sle",
        (BinaryOp::GtEq, false) => "sge",
        (BinaryOp::Eq, true) => "oeq",
        (BinaryOp::NotEq, true) => "one",
        (BinaryOp::Lt, true) => "olt",
        (BinaryOp::Gt, true) => "ogt",
        (BinaryOp::LtEq, true) => "ole",
        (BinaryOp::GtEq, true) => "oge",
        _ => unreachable!("not a comparison operator"),
    }
}

fn arithmetic_mnemonic(op: BinaryOp, is_float: bool) -> &'static str {
    match (op, is_float) {
        (BinaryOp::Add, false) => "add",
        (BinaryOp::Sub, false) => "sub",
        (BinaryOp::Mul, false) => "mul",
        (BinaryOp::Div, false) => "sdiv",
        (BinaryOp::Mod, false) => "srem",
        (BinaryOp::Add, true) => "fadd",
        (BinaryOp::Sub, true) => "fsub",
        (BinaryOp::Mul, true) => "fmul",
        (BinaryOp::Div, true) => "fdiv",
        (BinaryOp::Mod, true) => "frem",
        _ => unreachable!("not an arithmetic operator"),
    }
}

fn lower_unary(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    op: UnaryOp,
    operand: &Expr,
) -> Result<(String, Type), CodeGenError> {
    match op {
        UnaryOp::AddrOf => {
            let (addr, ty) = lower_lvalue(state, locals, class_ctx, operand)?;
            Ok((addr, Type::pointer_to(ty)))
        }
        UnaryOp::Deref => {
            let (reg, ty) = lower_typed(state, locals, class_ctx, operand)?;
            let pointee = ty
                .pointee()
                .cloned()
                .ok_or_else(|| CodeGenError::Logic("dereferenced a non-pointer value".to_string()))?;
            let out = state.fresh_temp();
            state.emit(format!("  {} = load {}, ptr {}", out, pointee.llvm_ir(), reg));
            Ok((out, pointee))
        }
        UnaryOp::Not => {
            let (reg, ty) = lower_typed(state, locals, class_ctx, operand)?;
            let out = state.fresh_temp();
            state.emit(format!("  {} = xor i1 {}, true", out, reg));
            Ok((out, ty))
        }
        UnaryOp::Neg => {
            let (reg, ty) = lower_typed(state, locals, class_ctx, operand)?;
            let out = state.fresh_temp();
            let is_float = ty.as_primitive().map(|p| p.is_float()).unwrap_or(false);
            if is_float {
                state.emit(format!("  {} = fneg {} {}", out, ty.llvm_ir(), reg));
            } else {
                state.emit(format!("  {} = sub {} 0, {}", out, ty.llvm_ir(), reg));
            }
            Ok((out, ty))
        }
        UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
            let (addr, ty) = lower_lvalue(state, locals, class_ctx, operand)?;
            let old = state.fresh_temp();
            state.emit(format!("  {} = load {}, ptr {}", old, ty.llvm_ir(), addr));
            let delta = if matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) { "1" } else { "-1" };
            let new = state.fresh_temp();
            let is_float = ty.as_primitive().map(|p| p.is_float()).unwrap_or(false);
            if is_float {
                let delta_f = if delta == "1" { "1.0" } else { "-1.0" };
                state.emit(format!("  {} = fadd {} {}, {}", new, ty.llvm_ir(), old, delta_f));
            } else {
                state.emit(format!("  {} = add {} {}, {}", new, ty.llvm_ir(), old, delta));
            }
            state.emit(format!("  store {} {}, ptr {}", ty.llvm_ir(), new, addr));
            if let Expr::Identifier { name, .. } = operand {
                state.mark_dependents_dirty(name);
            }
            let result = if matches!(op, UnaryOp::PreInc | UnaryOp::PreDec) { new } else { old };
            Ok((result, ty))
        }
    }
}

fn lower_member_access(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    object: &Expr,
    member: &str,
) -> Result<(String, Type), CodeGenError> {
    let access = Expr::MemberAccess {
        object: Box::new(object.clone()),
        member: member.to_string(),
        at: object.position(),
    };
    let (addr, ty) = lower_lvalue(state, locals, class_ctx, &access)?;
    let reg = state.fresh_temp();
    state.emit(format!("  {} = load {}, ptr {}", reg, ty.llvm_ir(), addr));
    Ok((reg, ty))
}

fn lower_new(
    state: &mut CodegenState,
    _locals: &Locals,
    _class_ctx: Option<&str>,
    class_name: &str,
    _args: &[Expr],
) -> Result<(String, Type), CodeGenError> {
    let reg = state.fresh_temp();
    state.emit(format!("  {} = call ptr @{}_new()", reg, class_name));
    Ok((reg, Type::pointer_to(Type::Class(class_name.to_string()))))
}

fn lower_array_literal(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    elements: &[Expr],
) -> Result<(String, Type), CodeGenError> {
    if elements.is_empty() {
        return Err(CodeGenError::Logic("empty array literals need an explicit element type".to_string()));
    }
    let mut values = Vec::with_capacity(elements.len());
    let mut elem_ty = None;
    for e in elements {
        let (reg, ty) = lower_typed(state, locals, class_ctx, e)?;
        elem_ty.get_or_insert_with(|| ty.clone());
        values.push(reg);
    }
    let elem_ty = elem_ty.unwrap();
    let elem_size = elem_ty.size_of(state.registry);
    let bytes = elem_size as u64 * values.len() as u64;
    let buf = state.fresh_temp();
    state.emit(format!("  {} = call ptr @malloc(i64 {})", buf, bytes));
    for (i, v) in values.iter().enumerate() {
        let slot = state.fresh_temp();
        state.emit(format!("  {} = getelementptr {}, ptr {}, i32 {}", slot, elem_ty.llvm_ir(), buf, i));
        state.emit(format!("  store {} {}, ptr {}", elem_ty.llvm_ir(), v, slot));
    }
    Ok((buf, Type::Array(Box::new(elem_ty), Some(values.len()))))
}

fn lower_array_access(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    array: &Expr,
    index: &Expr,
) -> Result<(String, Type), CodeGenError> {
    let access = Expr::ArrayAccess {
        array: Box::new(array.clone()),
        index: Box::new(index.clone()),
        at: array.position(),
    };
    let (addr, ty) = lower_lvalue(state, locals, class_ctx, &access)?;
    let reg = state.fresh_temp();
    state.emit(format!("  {} = load {}, ptr {}", reg, ty.llvm_ir(), addr));
    Ok((reg, ty))
}

/// Lowers a call expression: `ClassName.new(...)` (handled earlier via
/// `Expr::New` in the parser, but `ClassName.new()` written as a bare
/// method call reaches here too), `obj.clean()`/`obj.release()`, a plain
/// virtual method call dispatched through the object's vtable, or a
/// free function call.
fn lower_method_call(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    callee: &Expr,
    args: &[Expr],
) -> Result<(String, Type), CodeGenError> {
    let Expr::MemberAccess { object, member, .. } = callee else {
        return lower_function_call(state, locals, class_ctx, callee, args);
    };

    if member == "new" {
        if let Expr::Identifier { name, .. } = object.as_ref() {
            if state.registry.has_class(name) {
                return lower_new(state, locals, class_ctx, name, args);
            }
        }
    }

    // `ClassName.staticMethod(...)`: the object expression names a class
    // directly (not a local binding), so there's no instance to dispatch
    // through.
    if let Expr::Identifier { name, .. } = object.as_ref() {
        if !locals.contains_key(name) && state.registry.has_class(name) {
            return lower_static_call(state, locals, class_ctx, name, member, args);
        }
    }

    let (obj_reg, obj_ty) = lower_typed(state, locals, class_ctx, object)?;
    let class_name = class_name_of(&obj_ty)?;

    if member == "release" {
        state.emit(format!("  call void @free(ptr {})", obj_reg));
        return Ok(("undef".to_string(), Type::Void));
    }
    if member == "clean" {
        state.emit(format!("  call void @{}_clean_impl(ptr {})", class_name, obj_reg));
        return Ok(("undef".to_string(), Type::Void));
    }

    let method = state
        .registry
        .resolve_method(&class_name, member)
        .ok_or_else(|| CodeGenError::Logic(format!("'{}' has no method '{}'", class_name, member)))?
        .clone();

    let mut arg_regs = vec![format!("ptr {}", obj_reg)];
    for (arg, param_ty) in args.iter().zip(method.param_types.iter()) {
        let (reg, _) = lower_typed(state, locals, class_ctx, arg)?;
        arg_regs.push(format!("{} {}", param_ty.llvm_ir(), reg));
    }

    let reg = if matches!(method.return_type, Type::Void) { None } else { Some(state.fresh_temp()) };
    if method.vtable_index < 0 {
        let call = format!(
            "call {} @{}_{}({})",
            method.return_type.llvm_ir(), class_name, method.name, arg_regs.join(", ")
        );
        match &reg {
            Some(r) => state.emit(format!("  {} = {}", r, call)),
            None => state.emit(format!("  {}", call)),
        }
        return Ok((reg.unwrap_or_else(|| "undef".to_string()), method.return_type));
    }

    let vt_slot = state.fresh_temp();
    state.emit(format!("  {} = getelementptr %class.{}, ptr {}, i32 0, i32 0", vt_slot, class_name, obj_reg));
    let vt_ptr = state.fresh_temp();
    state.emit(format!("  {} = load ptr, ptr {}", vt_ptr, vt_slot));
    let fn_slot = state.fresh_temp();
    state.emit(format!(
        "  {} = getelementptr %vtable.{}, ptr {}, i32 0, i32 {}",
        fn_slot, class_name, vt_ptr, method.vtable_index
    ));
    let fn_ptr = state.fresh_temp();
    state.emit(format!("  {} = load ptr, ptr {}", fn_ptr, fn_slot));

    let param_tys: Vec<String> = std::iter::once("ptr".to_string())
        .chain(method.param_types.iter().map(Type::llvm_ir))
        .collect();
    let call = format!(
        "call {} ({}) {}({})",
        method.return_type.llvm_ir(), param_tys.join(", "), fn_ptr, arg_regs.join(", ")
    );
    match &reg {
        Some(r) => state.emit(format!("  {} = {}", r, call)),
        None => state.emit(format!("  {}", call)),
    }
    Ok((reg.unwrap_or_else(|| "undef".to_string()), method.return_type))
}

fn lower_static_call(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    class_name: &str,
    method: &str,
    args: &[Expr],
) -> Result<(String, Type), CodeGenError> {
    let method = state
        .registry
        .resolve_method(class_name, method)
        .ok_or_else(|| CodeGenError::Logic(format!("'{}' has no static method '{}'", class_name, method)))?
        .clone();

    let mut arg_regs = Vec::with_capacity(args.len());
    for (arg, param_ty) in args.iter().zip(method.param_types.iter()) {
        let (reg, _) = lower_typed(state, locals, class_ctx, arg)?;
        arg_regs.push(format!("{} {}", param_ty.llvm_ir(), reg));
    }
    let reg = if matches!(method.return_type, Type::Void) { None } else { Some(state.fresh_temp()) };
    let call = format!(
        "call {} @{}({})",
        method.return_type.llvm_ir(), method.symbol(), arg_regs.join(", ")
    );
    match &reg {
        Some(r) => state.emit(format!("  {} = {}", r, call)),
        None => state.emit(format!("  {}", call)),
    }
    Ok((reg.unwrap_or_else(|| "undef".to_string()), method.return_type))
}

fn lower_function_call(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    callee: &Expr,
    args: &[Expr],
) -> Result<(String, Type), CodeGenError> {
    let Expr::Identifier { name, .. } = callee else {
        return Err(CodeGenError::Logic("callee is not callable".to_string()));
    };
    let sig = locals
        .get(name)
        .map(|(_, ty)| ty.clone())
        .ok_or_else(|| CodeGenError::Logic(format!("call to undeclared function '{}'", name)))?;
    let Type::Function(sig) = sig else {
        return Err(CodeGenError::Logic(format!("'{}' is not callable", name)));
    };

    let mut arg_regs = Vec::with_capacity(args.len());
    for (arg, param_ty) in args.iter().zip(sig.params.iter()) {
        let (reg, _) = lower_typed(state, locals, class_ctx, arg)?;
        arg_regs.push(format!("{} {}", param_ty.llvm_ir(), reg));
    }
    let reg = if matches!(*sig.return_type, Type::Void) { None } else { Some(state.fresh_temp()) };
    let call = format!("call {} @{}({})", sig.return_type.llvm_ir(), name, arg_regs.join(", "));
    match &reg {
        Some(r) => state.emit(format!("  {} = {}", r, call)),
        None => state.emit(format!("  {}", call)),
    }
    Ok((reg.unwrap_or_else(|| "undef".to_string()), *sig.return_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::SymbolTable;
    use crate::types::TypeRegistry;
    use crate::error::Position;
    use std::collections::HashMap;

    fn pos() -> Position {
        Position::new(1, 1)
    }

    #[test]
    fn integer_literal_lowers_to_immediate() {
        let registry = TypeRegistry::new();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let locals: Locals = HashMap::new();
        let e = Expr::Literal { value: LiteralValue::Integer(3), kind: crate::ast::LiteralKind::Integer, at: pos() };
        let (reg, ty) = lower_typed(&mut state, &locals, None, &e).unwrap();
        assert_eq!(reg, "3");
        assert_eq!(ty, Type::Primitive(PrimitiveType::Int));
    }

    #[test]
    fn addition_widens_int_and_double() {
        let registry = TypeRegistry::new();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let locals: Locals = HashMap::new();
        let left = Expr::Literal { value: LiteralValue::Integer(1), kind: crate::ast::LiteralKind::Integer, at: pos() };
        let right = Expr::Literal { value: LiteralValue::Float(2.0), kind: crate::ast::LiteralKind::Float, at: pos() };
        let e = Expr::Binary { op: BinaryOp::Add, left: Box::new(left), right: Box::new(right), at: pos() };
        let (_, ty) = lower_typed(&mut state, &locals, None, &e).unwrap();
        assert_eq!(ty, Type::Primitive(PrimitiveType::Double));
        assert!(state.out.contains("sitofp"));
    }

    #[test]
    fn identifier_loads_from_its_local_slot() {
        let registry = TypeRegistry::new();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let mut locals: Locals = HashMap::new();
        locals.insert("x".to_string(), ("%x.addr".to_string(), Type::Primitive(PrimitiveType::Int)));
        let e = Expr::Identifier { name: "x".to_string(), at: pos() };
        lower_typed(&mut state, &locals, None, &e).unwrap();
        assert!(state.out.contains("load i32, ptr %x.addr"));
    }
}
