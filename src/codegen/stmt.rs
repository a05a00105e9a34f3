//! Statement lowering (spec §4.6): variable declarations, assignment,
//! control flow with labeled basic blocks, `return`, and `print`/`println`.
//!
//! `Locals` is passed by value into each nested block so declarations
//! inside an `if`/`while`/`for` body don't leak out, mirroring the
//! lexical scoping the semantic analyzer already enforced; an assignment
//! or mutation still reaches back through `locals` (identical map
//! contents for bindings declared outside the nested block) so it writes
//! through the right address.

use super::expr::{lower_expr, lower_lvalue, lower_typed};
use super::state::CodegenState;
use super::Locals;
use crate::ast::{Block, Expr, Statement};
use crate::error::CodeGenError;
use crate::types::{PrimitiveType, Type};

/// Lowers a function/method body. `returns_value` controls whether a
/// fall-off-the-end needs a synthesized `ret void` (spec §4.6: every
/// basic block must end with a terminator).
pub fn lower_body(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    body: &Block,
    return_type: &Type,
) -> Result<(), CodeGenError> {
    lower_block_statements(state, locals, class_ctx, &body.statements)?;
    if !ends_in_terminator(&body.statements) {
        if matches!(return_type, Type::Void) {
            state.emit("  ret void");
        } else {
            state.emit(format!("  ret {} {}", return_type.llvm_ir(), zero_value(return_type)));
        }
    }
    Ok(())
}

fn zero_value(ty: &Type) -> &'static str {
    match ty {
        Type::Primitive(p) if p.is_float() => "0.0",
        Type::Primitive(_) => "0",
        _ => "null",
    }
}

fn ends_in_terminator(statements: &[Statement]) -> bool {
    matches!(
        statements.last(),
        Some(Statement::Return { .. }) | Some(Statement::Break(_)) | Some(Statement::Continue(_))
    )
}

fn lower_block(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    block: &Block,
) -> Result<(), CodeGenError> {
    let mut inner = locals.clone();
    lower_block_statements(state, &mut inner, class_ctx, &block.statements)
}

fn lower_block_statements(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    statements: &[Statement],
) -> Result<(), CodeGenError> {
    for stmt in statements {
        lower_statement(state, locals, class_ctx, stmt)?;
    }
    Ok(())
}

fn lower_statement(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    stmt: &Statement,
) -> Result<(), CodeGenError> {
    match stmt {
        Statement::Block(block) => lower_block(state, locals, class_ctx, block),
        Statement::VariableDeclaration { name, initializer, .. } => {
            lower_variable_declaration(state, locals, class_ctx, name, initializer)
        }
        Statement::Expression(expr) => {
            lower_expr(state, locals, class_ctx, expr)?;
            Ok(())
        }
        Statement::Assignment { target, value, .. } => lower_assignment(state, locals, class_ctx, target, value),
        Statement::Return { value, .. } => lower_return(state, locals, class_ctx, value),
        Statement::If { condition, then_block, else_block, .. } => {
            lower_if(state, locals, class_ctx, condition, then_block, else_block.as_ref())
        }
        Statement::While { condition, body, .. } => lower_while(state, locals, class_ctx, condition, body),
        Statement::For { init, condition, update, body, .. } => {
            lower_for(state, locals, class_ctx, init.as_deref(), condition.as_ref(), update.as_deref(), body)
        }
        Statement::ForEach { var_name, collection, body, .. } => {
            lower_foreach(state, locals, class_ctx, var_name, collection, body)
        }
        Statement::Break(_) => {
            let (_, brk) = state
                .loop_labels
                .last()
                .cloned()
                .ok_or_else(|| CodeGenError::Logic("'break' outside of a loop".to_string()))?;
            state.emit(format!("  br label %{}", brk));
            Ok(())
        }
        Statement::Continue(_) => {
            let (cont, _) = state
                .loop_labels
                .last()
                .cloned()
                .ok_or_else(|| CodeGenError::Logic("'continue' outside of a loop".to_string()))?;
            state.emit(format!("  br label %{}", cont));
            Ok(())
        }
        Statement::Print { args, newline, .. } => lower_print(state, locals, class_ctx, args, *newline),
    }
}

fn lower_variable_declaration(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    name: &str,
    initializer: &Option<Expr>,
) -> Result<(), CodeGenError> {
    let (value_reg, ty) = match initializer {
        Some(expr) => lower_typed(state, locals, class_ctx, expr)?,
        None => return Err(CodeGenError::Logic(format!("'{}' has no initializer to infer its type from", name))),
    };
    let addr = state.fresh_temp();
    state.emit(format!("  {} = alloca {}", addr, ty.llvm_ir()));
    state.emit(format!("  store {} {}, ptr {}", ty.llvm_ir(), value_reg, addr));
    locals.insert(name.to_string(), (addr, ty));
    Ok(())
}

fn lower_assignment(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    target: &Expr,
    value: &Expr,
) -> Result<(), CodeGenError> {
    let (addr, ty) = lower_lvalue(state, locals, class_ctx, target)?;
    let (value_reg, _) = lower_typed(state, locals, class_ctx, value)?;
    state.emit(format!("  store {} {}, ptr {}", ty.llvm_ir(), value_reg, addr));
    if let Expr::Identifier { name, .. } = target {
        state.mark_dependents_dirty(name);
    }
    Ok(())
}

fn lower_return(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    value: &Option<Expr>,
) -> Result<(), CodeGenError> {
    match value {
        Some(expr) => {
            let (reg, ty) = lower_typed(state, locals, class_ctx, expr)?;
            state.emit(format!("  ret {} {}", ty.llvm_ir(), reg));
        }
        None => state.emit("  ret void"),
    }
    Ok(())
}

fn lower_if(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    condition: &Expr,
    then_block: &Block,
    else_block: Option<&Block>,
) -> Result<(), CodeGenError> {
    let (cond_reg, _) = lower_typed(state, locals, class_ctx, condition)?;
    let then_label = state.fresh_label("if.then");
    let else_label = state.fresh_label("if.else");
    let end_label = state.fresh_label("if.end");

    state.emit(format!("  br i1 {}, label %{}, label %{}", cond_reg, then_label, else_label));
    state.emit(format!("{}:", then_label));
    lower_block(state, locals, class_ctx, then_block)?;
    state.emit(format!("  br label %{}", end_label));

    state.emit(format!("{}:", else_label));
    if let Some(else_block) = else_block {
        lower_block(state, locals, class_ctx, else_block)?;
    }
    state.emit(format!("  br label %{}", end_label));

    state.emit(format!("{}:", end_label));
    Ok(())
}

fn lower_while(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    condition: &Expr,
    body: &Block,
) -> Result<(), CodeGenError> {
    let head_label = state.fresh_label("while.cond");
    let body_label = state.fresh_label("while.body");
    let end_label = state.fresh_label("while.end");

    state.emit(format!("  br label %{}", head_label));
    state.emit(format!("{}:", head_label));
    let (cond_reg, _) = lower_typed(state, locals, class_ctx, condition)?;
    state.emit(format!("  br i1 {}, label %{}, label %{}", cond_reg, body_label, end_label));

    state.emit(format!("{}:", body_label));
    state.loop_labels.push((head_label.clone(), end_label.clone()));
    lower_block(state, locals, class_ctx, body)?;
    state.loop_labels.pop();
    state.emit(format!("  br label %{}", head_label));

    state.emit(format!("{}:", end_label));
    Ok(())
}

fn lower_for(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    init: Option<&Statement>,
    condition: Option<&Expr>,
    update: Option<&Statement>,
    body: &Block,
) -> Result<(), CodeGenError> {
    let mut scope = locals.clone();
    if let Some(init) = init {
        lower_statement(state, &mut scope, class_ctx, init)?;
    }

    let head_label = state.fresh_label("for.cond");
    let body_label = state.fresh_label("for.body");
    let update_label = state.fresh_label("for.update");
    let end_label = state.fresh_label("for.end");

    state.emit(format!("  br label %{}", head_label));
    state.emit(format!("{}:", head_label));
    match condition {
        Some(cond) => {
            let (cond_reg, _) = lower_typed(state, &scope, class_ctx, cond)?;
            state.emit(format!("  br i1 {}, label %{}, label %{}", cond_reg, body_label, end_label));
        }
        None => state.emit(format!("  br label %{}", body_label)),
    }

    state.emit(format!("{}:", body_label));
    state.loop_labels.push((update_label.clone(), end_label.clone()));
    lower_block(state, &scope, class_ctx, body)?;
    state.loop_labels.pop();
    state.emit(format!("  br label %{}", update_label));

    state.emit(format!("{}:", update_label));
    if let Some(update) = update {
        lower_statement(state, &mut scope, class_ctx, update)?;
    }
    state.emit(format!("  br label %{}", head_label));

    state.emit(format!("{}:", end_label));
    Ok(())
}

/// Desugars `for (T x : collection) body` into an index-driven loop over
/// the collection's backing buffer: `array[]` is the only collection
/// type the type system admits (spec §4.3), so `foreach` always has a
/// known element count via the pointer arithmetic the array literal
/// lowering already established.
fn lower_foreach(
    state: &mut CodegenState,
    locals: &mut Locals,
    class_ctx: Option<&str>,
    var_name: &str,
    collection: &Expr,
    body: &Block,
) -> Result<(), CodeGenError> {
    let (arr_reg, arr_ty) = lower_typed(state, locals, class_ctx, collection)?;
    let (elem_ty, count) = match &arr_ty {
        Type::Array(inner, Some(n)) => ((**inner).clone(), *n),
        Type::Array(inner, None) => ((**inner).clone(), 0),
        _ => return Err(CodeGenError::Logic("'foreach' requires an array collection".to_string())),
    };

    let idx_addr = state.fresh_temp();
    state.emit(format!("  {} = alloca i32", idx_addr));
    state.emit(format!("  store i32 0, ptr {}", idx_addr));

    let head_label = state.fresh_label("foreach.cond");
    let body_label = state.fresh_label("foreach.body");
    let update_label = state.fresh_label("foreach.update");
    let end_label = state.fresh_label("foreach.end");

    state.emit(format!("  br label %{}", head_label));
    state.emit(format!("{}:", head_label));
    let idx_val = state.fresh_temp();
    state.emit(format!("  {} = load i32, ptr {}", idx_val, idx_addr));
    let cmp = state.fresh_temp();
    state.emit(format!("  {} = icmp slt i32 {}, {}", cmp, idx_val, count));
    state.emit(format!("  br i1 {}, label %{}, label %{}", cmp, body_label, end_label));

    state.emit(format!("{}:", body_label));
    let elem_slot = state.fresh_temp();
    state.emit(format!("  {} = getelementptr {}, ptr {}, i32 {}", elem_slot, elem_ty.llvm_ir(), arr_reg, idx_val));
    let mut inner = locals.clone();
    inner.insert(var_name.to_string(), (elem_slot, elem_ty));
    state.loop_labels.push((update_label.clone(), end_label.clone()));
    lower_block_statements(state, &mut inner, class_ctx, &body.statements)?;
    state.loop_labels.pop();
    state.emit(format!("  br label %{}", update_label));

    state.emit(format!("{}:", update_label));
    let next = state.fresh_temp();
    state.emit(format!("  {} = add i32 {}, 1", next, idx_val));
    state.emit(format!("  store i32 {}, ptr {}", next, idx_addr));
    state.emit(format!("  br label %{}", head_label));

    state.emit(format!("{}:", end_label));
    Ok(())
}

fn lower_print(
    state: &mut CodegenState,
    locals: &Locals,
    class_ctx: Option<&str>,
    args: &[Expr],
    newline: bool,
) -> Result<(), CodeGenError> {
    let mut fmt = String::new();
    let mut call_args = Vec::new();
    for arg in args {
        let (reg, ty) = lower_typed(state, locals, class_ctx, arg)?;
        match &ty {
            Type::Primitive(PrimitiveType::Boolean) => {
                let as_str = state.fresh_temp();
                state.emit(format!(
                    "  {} = select i1 {}, ptr @.str.bool.true, ptr @.str.bool.false",
                    as_str, reg
                ));
                fmt.push_str("%s");
                call_args.push(format!("ptr {}", as_str));
            }
            Type::Primitive(p) if p.is_float() => {
                fmt.push_str("%f");
                call_args.push(format!("{} {}", ty.llvm_ir(), reg));
            }
            Type::Primitive(_) => {
                fmt.push_str("%d");
                call_args.push(format!("{} {}", ty.llvm_ir(), reg));
            }
            Type::DStr => {
                let as_cstr = state.fresh_temp();
                state.emit(format!("  {} = call ptr @DString_get(ptr {})", as_cstr, reg));
                fmt.push_str("%s");
                call_args.push(format!("ptr {}", as_cstr));
            }
            Type::Str => {
                fmt.push_str("%s");
                call_args.push(format!("ptr {}", reg));
            }
            _ => {
                fmt.push_str("%p");
                call_args.push(format!("ptr {}", reg));
            }
        }
    }
    if newline {
        fmt.push('\n');
    }
    let idx = state.symbols.intern_string(&fmt);
    let fmt_global = format!("@.str.{}", idx);
    let suffix = if call_args.is_empty() { String::new() } else { format!(", {}", call_args.join(", ")) };
    state.emit(format!("  call i32 (ptr, ...) @printf(ptr {}{})", fmt_global, suffix));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LiteralValue;
    use crate::error::Position;
    use crate::symtab::SymbolTable;
    use crate::types::TypeRegistry;
    use std::collections::HashMap;

    fn pos() -> Position {
        Position::new(1, 1)
    }

    #[test]
    fn variable_declaration_allocates_and_stores() {
        let registry = TypeRegistry::new();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let mut locals: Locals = HashMap::new();
        let init = Expr::Literal { value: LiteralValue::Integer(5), kind: crate::ast::LiteralKind::Integer, at: pos() };
        lower_variable_declaration(&mut state, &mut locals, None, "n", &Some(init)).unwrap();
        assert!(locals.contains_key("n"));
        assert!(state.out.contains("alloca i32"));
        assert!(state.out.contains("store i32 5"));
    }

    #[test]
    fn while_loop_emits_three_labeled_blocks() {
        let registry = TypeRegistry::new();
        let mut state = CodegenState::new(&registry, SymbolTable::new());
        let mut locals: Locals = HashMap::new();
        let cond = Expr::Literal { value: LiteralValue::Boolean(true), kind: crate::ast::LiteralKind::Boolean, at: pos() };
        let body = Block { statements: vec![Statement::Break(pos())] };
        lower_while(&mut state, &mut locals, None, &cond, &body).unwrap();
        assert!(state.out.contains("while.cond"));
        assert!(state.out.contains("while.body"));
        assert!(state.out.contains("while.end"));
    }
}
