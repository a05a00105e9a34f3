//! Semantic analyzer (spec §4.4): four ordered passes over the AST that
//! populate the type registry and symbol table and type-check every
//! expression. Diagnostics accumulate across all four passes; a bundled
//! `SemanticError` is raised only after the last pass has run, so later
//! passes still see as much of the program as could be registered.

use crate::ast::*;
use crate::error::{Diagnostic, Position, SemanticError};
use crate::symtab::{Symbol, SymbolKind, SymbolTable};
use crate::types::{
    ClassType, FieldInfo, FunctionSignature, InterfaceInfo, MethodInfo, MethodSig, PrimitiveType,
    Type, TypeRegistry, VtableSlot,
};

pub struct AnalysisResult {
    pub registry: TypeRegistry,
    pub symbols: SymbolTable,
    pub warnings: Vec<Diagnostic>,
}

pub fn analyze(program: &Program) -> Result<AnalysisResult, SemanticError> {
    let mut analyzer = Analyzer::new();
    analyzer.run(program);
    let errors: Vec<Diagnostic> = analyzer
        .diagnostics
        .iter()
        .filter(|d| d.is_error())
        .cloned()
        .collect();
    if !errors.is_empty() {
        return Err(SemanticError { diagnostics: errors });
    }
    let warnings = analyzer
        .diagnostics
        .into_iter()
        .filter(|d| !d.is_error())
        .collect();
    Ok(AnalysisResult {
        registry: analyzer.registry,
        symbols: analyzer.symbols,
        warnings,
    })
}

struct Analyzer {
    registry: TypeRegistry,
    symbols: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    /// Name of the enclosing class while walking a method body, for
    /// implicit-`this` field fallback (spec §4.4 Identifier rule).
    current_class: Option<String>,
}

impl Analyzer {
    fn new() -> Self {
        Analyzer {
            registry: TypeRegistry::new(),
            symbols: SymbolTable::new(),
            diagnostics: Vec::new(),
            current_class: None,
        }
    }

    fn error(&mut self, message: impl Into<String>, at: Position) {
        self.diagnostics.push(Diagnostic::error(message, Some(at)));
    }

    fn warn(&mut self, message: impl Into<String>, at: Position) {
        self.diagnostics.push(Diagnostic::warning(message, Some(at)));
    }

    fn run(&mut self, program: &Program) {
        self.pass1_register_classes(program);
        self.pass2_resolve_hierarchy(program);
        self.pass3_analyze_members(program);
        self.pass4_analyze_functions(program);
    }

    // ------------------------------------------------------------------
    // Pass 1: class (and interface) registration
    // ------------------------------------------------------------------

    fn pass1_register_classes(&mut self, program: &Program) {
        for decl in &program.declarations {
            match decl {
                Declaration::Class(c) => {
                    if let Err(msg) = self.registry.register_class(ClassType::new(&c.name)) {
                        self.error(msg, c.at);
                        continue;
                    }
                    let _ = self.symbols.define(Symbol {
                        name: c.name.clone(),
                        kind: SymbolKind::Class,
                        ty: Type::Class(c.name.clone()),
                        is_const: true,
                        emission_name: c.name.clone(),
                        initialized: true,
                        pointer_allocated: false,
                    });
                }
                Declaration::Interface(i) => {
                    let methods = i
                        .methods
                        .iter()
                        .map(|m| MethodSig {
                            name: m.name.clone(),
                            param_types: m
                                .params
                                .iter()
                                .map(|p| self.resolve_type_name_lenient(&p.type_name))
                                .collect(),
                            return_type: self.resolve_type_name_lenient(&m.return_type),
                        })
                        .collect();
                    if let Err(msg) = self.registry.register_interface(InterfaceInfo {
                        name: i.name.clone(),
                        methods,
                    }) {
                        self.error(msg, i.at);
                    }
                }
                Declaration::Function(_) => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: hierarchy resolution
    // ------------------------------------------------------------------

    fn pass2_resolve_hierarchy(&mut self, program: &Program) {
        for decl in &program.declarations {
            let Declaration::Class(c) = decl else { continue };
            if let Some(base) = &c.base {
                if !self.registry.has_class(base) {
                    self.error(format!("Unknown base class '{}' for class '{}'", base, c.name), c.at);
                    continue;
                }
                if let Some(class) = self.registry.get_class_mut(&c.name) {
                    class.parent = Some(base.clone());
                }
            }
            if let Some(class) = self.registry.get_class_mut(&c.name) {
                class.interfaces = c.interfaces.clone();
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 3: member analysis
    // ------------------------------------------------------------------

    /// Depth of `name` in its `extends` chain (0 for a root class). Used to
    /// walk classes parent-first, so a subclass always sees its parent's
    /// already-finalized fields/vtable when it seeds its own.
    fn class_depth(&self, name: &str) -> usize {
        let mut depth = 0;
        let mut current = name.to_string();
        let mut seen = std::collections::HashSet::new();
        while let Some(parent) = self.registry.get_class(&current).and_then(|c| c.parent.clone()) {
            if !seen.insert(current.clone()) {
                break;
            }
            depth += 1;
            current = parent;
        }
        depth
    }

    fn pass3_analyze_members(&mut self, program: &Program) {
        let mut class_decls: Vec<&ClassDeclaration> = program
            .declarations
            .iter()
            .filter_map(|d| match d {
                Declaration::Class(c) => Some(c),
                _ => None,
            })
            .collect();
        class_decls.sort_by_key(|c| self.class_depth(&c.name));

        for c in class_decls {
            self.registry.seed_inheritance(&c.name);
            self.current_class = Some(c.name.clone());
            self.symbols.push_scope(format!("class {}", c.name));
            self.analyze_members(&c.name, &c.members, Visibility::Public);
            self.symbols.pop_scope();
            self.current_class = None;
        }
    }

    fn analyze_members(&mut self, class_name: &str, members: &[ClassMember], default_vis: Visibility) {
        for member in members {
            match member {
                ClassMember::Scope(vis, inner) => {
                    self.analyze_members(class_name, inner, vis.clone());
                }
                ClassMember::Field(field) => {
                    self.analyze_field(class_name, field, default_vis.clone());
                }
                ClassMember::Method(method) => {
                    self.analyze_method(class_name, method, default_vis.clone());
                }
            }
        }
    }

    fn analyze_field(&mut self, class_name: &str, field: &FieldDeclaration, visibility: Visibility) {
        let field_type = self.resolve_type_name(&field.type_name, field.at);
        let attrs = field.attributes.clone().unwrap_or_default();

        if attrs.serializable && !matches!(visibility, Visibility::Public) {
            self.error(
                format!(
                    "Field '{}' is marked serializable but is not public",
                    field.name
                ),
                field.at,
            );
        }
        if attrs.derived && attrs.serializable {
            self.warn(
                format!(
                    "Field '{}' is both derived and serializable",
                    field.name
                ),
                field.at,
            );
        }

        if let Some(init) = &field.initializer {
            let init_ty = self.type_of_expr(init, Some(class_name));
            self.check_compatible(&field_type, &init_ty, field.at, &field.name);
        }

        let info = FieldInfo {
            name: field.name.clone(),
            field_type,
            offset: 0,
            is_const: field.is_const,
            visibility,
            attributes: attrs,
            initializer: field.initializer.clone(),
        };
        self.registry.add_field_to_class(class_name, info);
    }

    fn analyze_method(&mut self, class_name: &str, method: &MethodDeclaration, visibility: Visibility) {
        let return_type = self.resolve_type_name(&method.return_type, method.at);
        let param_types: Vec<Type> = method
            .params
            .iter()
            .map(|p| self.resolve_type_name(&p.type_name, method.at))
            .collect();
        let param_names: Vec<String> = method.params.iter().map(|p| p.name.clone()).collect();

        let vtable_index = if method.is_static {
            -1
        } else {
            let inherited = self
                .registry
                .get_class(class_name)
                .and_then(|c| c.vtable.iter().position(|slot| slot.method_name == method.name));
            match inherited {
                Some(idx) => {
                    if let Some(class) = self.registry.get_class_mut(class_name) {
                        class.vtable[idx].owner_class = class_name.to_string();
                    }
                    idx as i32
                }
                None => {
                    let idx = self
                        .registry
                        .get_class(class_name)
                        .map(|c| c.vtable.len())
                        .unwrap_or(0);
                    if let Some(class) = self.registry.get_class_mut(class_name) {
                        class.vtable.push(VtableSlot {
                            method_name: method.name.clone(),
                            owner_class: class_name.to_string(),
                        });
                    }
                    idx as i32
                }
            }
        };

        let info = MethodInfo {
            name: method.name.clone(),
            owner_class: class_name.to_string(),
            return_type: return_type.clone(),
            param_types: param_types.clone(),
            param_names: param_names.clone(),
            is_static: method.is_static,
            visibility,
            vtable_index,
        };
        if let Some(class) = self.registry.get_class_mut(class_name) {
            class.methods.push(info);
        }

        self.symbols.push_scope(format!("{}::{}", class_name, method.name));
        if !method.is_static {
            let _ = self.symbols.define(Symbol {
                name: "this".to_string(),
                kind: SymbolKind::Parameter,
                ty: Type::pointer_to(Type::Class(class_name.to_string())),
                is_const: false,
                emission_name: "%this".to_string(),
                initialized: true,
                pointer_allocated: false,
            });
        }
        for (name, ty) in param_names.iter().zip(param_types.iter()) {
            let _ = self.symbols.define(Symbol {
                name: name.clone(),
                kind: SymbolKind::Parameter,
                ty: ty.clone(),
                is_const: false,
                emission_name: format!("%{}", name),
                initialized: true,
                pointer_allocated: false,
            });
        }
        self.analyze_block(&method.body, Some(class_name), &return_type);
        self.symbols.pop_scope();
    }

    // ------------------------------------------------------------------
    // Pass 4: function analysis
    // ------------------------------------------------------------------

    fn pass4_analyze_functions(&mut self, program: &Program) {
        // Register every function signature up front so mutual calls resolve.
        for decl in &program.declarations {
            let Declaration::Function(f) = decl else { continue };
            let return_type = self.resolve_type_name_lenient(&f.return_type);
            let param_types: Vec<Type> = f
                .params
                .iter()
                .map(|p| self.resolve_type_name_lenient(&p.type_name))
                .collect();
            let _ = self.symbols.define(Symbol {
                name: f.name.clone(),
                kind: SymbolKind::Function,
                ty: Type::Function(Box::new(FunctionSignature {
                    params: param_types,
                    return_type: Box::new(return_type),
                })),
                is_const: true,
                emission_name: f.name.clone(),
                initialized: true,
                pointer_allocated: false,
            });
        }
        for decl in &program.declarations {
            let Declaration::Function(f) = decl else { continue };
            let return_type = self.resolve_type_name(&f.return_type, f.at);
            self.symbols.push_scope(format!("fn {}", f.name));
            for p in &f.params {
                let ty = self.resolve_type_name(&p.type_name, f.at);
                let _ = self.symbols.define(Symbol {
                    name: p.name.clone(),
                    kind: SymbolKind::Parameter,
                    ty,
                    is_const: false,
                    emission_name: format!("%{}", p.name),
                    initialized: true,
                    pointer_allocated: false,
                });
            }
            self.analyze_block(&f.body, None, &return_type);
            self.symbols.pop_scope();
        }
    }

    // ------------------------------------------------------------------
    // Statement / expression walking shared by methods and functions
    // ------------------------------------------------------------------

    fn analyze_block(&mut self, block: &Block, class_ctx: Option<&str>, return_type: &Type) {
        self.symbols.push_scope("block");
        for stmt in &block.statements {
            self.analyze_statement(stmt, class_ctx, return_type);
        }
        self.symbols.pop_scope();
    }

    fn analyze_statement(&mut self, stmt: &Statement, class_ctx: Option<&str>, return_type: &Type) {
        match stmt {
            Statement::Block(b) => self.analyze_block(b, class_ctx, return_type),
            Statement::VariableDeclaration {
                name,
                type_name,
                is_const,
                initializer,
                at,
            } => {
                let declared = self.resolve_type_name(type_name, *at);
                if let Some(init) = initializer {
                    let init_ty = self.type_of_expr(init, class_ctx);
                    self.check_compatible(&declared, &init_ty, *at, name);
                }
                let _ = self.symbols.define(Symbol {
                    name: name.clone(),
                    kind: SymbolKind::Variable,
                    ty: declared,
                    is_const: *is_const,
                    emission_name: format!("%{}", name),
                    initialized: initializer.is_some(),
                    pointer_allocated: initializer.as_ref().is_some_and(|e| e.is_allocation()),
                });
            }
            Statement::Expression(expr) => {
                self.type_of_expr(expr, class_ctx);
            }
            Statement::Assignment { target, value, at } => {
                let target_ty = self.type_of_expr(target, class_ctx);
                let value_ty = self.type_of_expr(value, class_ctx);
                self.check_compatible(&target_ty, &value_ty, *at, "assignment target");
            }
            Statement::Return { value, at } => match value {
                Some(expr) => {
                    let ty = self.type_of_expr(expr, class_ctx);
                    self.check_compatible(return_type, &ty, *at, "return value");
                }
                None => {
                    if !matches!(return_type, Type::Void) {
                        self.error("Missing return value for non-void function", *at);
                    }
                }
            },
            Statement::If {
                condition,
                then_block,
                else_block,
                at,
            } => {
                let cond_ty = self.type_of_expr(condition, class_ctx);
                self.check_compatible(&Type::Primitive(PrimitiveType::Boolean), &cond_ty, *at, "if condition");
                self.analyze_block(then_block, class_ctx, return_type);
                if let Some(b) = else_block {
                    self.analyze_block(b, class_ctx, return_type);
                }
            }
            Statement::While { condition, body, at } => {
                let cond_ty = self.type_of_expr(condition, class_ctx);
                self.check_compatible(&Type::Primitive(PrimitiveType::Boolean), &cond_ty, *at, "while condition");
                self.analyze_block(body, class_ctx, return_type);
            }
            Statement::For {
                init,
                condition,
                update,
                body,
                at,
            } => {
                self.symbols.push_scope("for");
                if let Some(init) = init {
                    self.analyze_statement(init, class_ctx, return_type);
                }
                if let Some(cond) = condition {
                    let ty = self.type_of_expr(cond, class_ctx);
                    self.check_compatible(&Type::Primitive(PrimitiveType::Boolean), &ty, *at, "for condition");
                }
                if let Some(update) = update {
                    self.analyze_statement(update, class_ctx, return_type);
                }
                self.analyze_block(body, class_ctx, return_type);
                self.symbols.pop_scope();
            }
            Statement::ForEach {
                var_name,
                var_type,
                collection,
                body,
                at,
            } => {
                self.type_of_expr(collection, class_ctx);
                self.symbols.push_scope("foreach");
                let ty = self.resolve_type_name(var_type, *at);
                let _ = self.symbols.define(Symbol {
                    name: var_name.clone(),
                    kind: SymbolKind::Variable,
                    ty,
                    is_const: false,
                    emission_name: format!("%{}", var_name),
                    initialized: true,
                    pointer_allocated: false,
                });
                self.analyze_block(body, class_ctx, return_type);
                self.symbols.pop_scope();
            }
            Statement::Break(_) | Statement::Continue(_) => {}
            Statement::Print { args, .. } => {
                for arg in args {
                    self.type_of_expr(arg, class_ctx);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Expression typing (spec §4.4)
    // ------------------------------------------------------------------

    fn type_of_expr(&mut self, expr: &Expr, class_ctx: Option<&str>) -> Type {
        match expr {
            Expr::Literal { kind, .. } => match kind {
                LiteralKind::Integer => Type::Primitive(PrimitiveType::Int),
                LiteralKind::Float => Type::Primitive(PrimitiveType::Float),
                LiteralKind::Boolean => Type::Primitive(PrimitiveType::Boolean),
                LiteralKind::String => Type::Str,
                LiteralKind::DString => Type::DStr,
                LiteralKind::Null => Type::Null,
            },
            Expr::Identifier { name, at } => self.type_of_identifier(name, class_ctx, *at),
            Expr::Binary { op, left, right, at } => {
                let lt = self.type_of_expr(left, class_ctx);
                let rt = self.type_of_expr(right, class_ctx);
                self.type_of_binary(*op, &lt, &rt, *at)
            }
            Expr::Unary { op, operand, at } => {
                let ot = self.type_of_expr(operand, class_ctx);
                self.type_of_unary(*op, &ot, *at)
            }
            Expr::MemberAccess { object, member, at } => {
                self.type_of_member_access(object, member, class_ctx, *at)
            }
            Expr::MethodCall { callee, args, at } => {
                self.type_of_method_call(callee, args, class_ctx, *at)
            }
            Expr::New { class_name, args, at, .. } => {
                if !self.registry.has_class(class_name) {
                    self.error(format!("Unknown class '{}'", class_name), *at);
                }
                for a in args {
                    self.type_of_expr(a, class_ctx);
                }
                Type::pointer_to(Type::Class(class_name.clone()))
            }
            Expr::ArrayLiteral { elements, .. } => {
                let elem_ty = elements
                    .first()
                    .map(|e| self.type_of_expr(e, class_ctx))
                    .unwrap_or(Type::Void);
                for e in elements.iter().skip(1) {
                    self.type_of_expr(e, class_ctx);
                }
                Type::Array(Box::new(elem_ty), Some(elements.len()))
            }
            Expr::ArrayAccess { array, index, at } => {
                let array_ty = self.type_of_expr(array, class_ctx);
                let index_ty = self.type_of_expr(index, class_ctx);
                self.check_compatible(&Type::Primitive(PrimitiveType::Int), &index_ty, *at, "array index");
                match array_ty {
                    Type::Array(inner, _) => *inner,
                    _ => {
                        self.error("Indexing a non-array expression", *at);
                        Type::Void
                    }
                }
            }
        }
    }

    fn type_of_identifier(&mut self, name: &str, class_ctx: Option<&str>, at: Position) -> Type {
        if let Some(sym) = self.symbols.resolve(name) {
            return sym.ty.clone();
        }
        // Fall back to a field of the enclosing class (implicit `this`).
        if let Some(class_name) = class_ctx {
            if let Some(field) = self.registry.resolve_field(class_name, name) {
                return field.field_type.clone();
            }
        }
        self.error(format!("Unknown identifier '{}'", name), at);
        Type::Void
    }

    fn type_of_binary(&mut self, op: BinaryOp, lt: &Type, rt: &Type, at: Position) -> Type {
        use BinaryOp::*;
        match op {
            Eq | NotEq | Lt | Gt | LtEq | GtEq | And | Or => {
                Type::Primitive(PrimitiveType::Boolean)
            }
            Add if matches!(lt, Type::Str | Type::DStr) || matches!(rt, Type::Str | Type::DStr) => {
                Type::Str
            }
            Add | Sub | Mul | Div | Mod => self.widen(lt, rt, at),
        }
    }

    fn widen(&mut self, lt: &Type, rt: &Type, at: Position) -> Type {
        match (lt.as_primitive(), rt.as_primitive()) {
            (Some(a), Some(b)) => Type::Primitive(if a.rank() >= b.rank() { a } else { b }),
            _ => {
                self.error(
                    format!("Cannot apply arithmetic to '{}' and '{}'", lt.name(), rt.name()),
                    at,
                );
                lt.clone()
            }
        }
    }

    fn type_of_unary(&mut self, op: UnaryOp, ot: &Type, at: Position) -> Type {
        match op {
            UnaryOp::Not => Type::Primitive(PrimitiveType::Boolean),
            UnaryOp::Neg => ot.clone(),
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => ot.clone(),
            UnaryOp::Deref => match ot.pointee() {
                Some(inner) => inner.clone(),
                None => {
                    self.error("Cannot dereference a non-pointer expression", at);
                    Type::Void
                }
            },
            UnaryOp::AddrOf => Type::pointer_to(ot.clone()),
        }
    }

    /// Member access auto-dereferences a pointer-to-class (spec §4.4).
    fn type_of_member_access(
        &mut self,
        object: &Expr,
        member: &str,
        class_ctx: Option<&str>,
        at: Position,
    ) -> Type {
        // `ClassName.new` is a special form: the constructor, typed as a
        // function `() -> pointer-to-class` (spec §4.4).
        if let Expr::Identifier { name, .. } = object {
            if member == "new" && self.registry.has_class(name) {
                return Type::Function(Box::new(FunctionSignature {
                    params: Vec::new(),
                    return_type: Box::new(Type::pointer_to(Type::Class(name.clone()))),
                }));
            }
        }
        let object_ty = self.type_of_expr(object, class_ctx);
        // `.clean()` is the built-in pointer-cleanup call every class
        // carries implicitly (spec §4.5); it has no entry in `ClassType`
        // because the code generator synthesizes it rather than the user.
        if member == "clean" && matches!(&object_ty, Type::Pointer(inner) if matches!(inner.as_ref(), Type::Class(_)))
        {
            return Type::Function(Box::new(FunctionSignature {
                params: Vec::new(),
                return_type: Box::new(Type::Void),
            }));
        }
        let class_name = match &object_ty {
            Type::Class(name) => name.clone(),
            Type::Pointer(inner) => match inner.as_ref() {
                Type::Class(name) => name.clone(),
                _ => {
                    self.error("Member access requires a class or pointer-to-class", at);
                    return Type::Void;
                }
            },
            _ => {
                self.error("Member access requires a class or pointer-to-class", at);
                return Type::Void;
            }
        };
        if let Some(field) = self.registry.resolve_field(&class_name, member) {
            return field.field_type.clone();
        }
        if let Some(method) = self.registry.resolve_method(&class_name, member) {
            return Type::Function(Box::new(FunctionSignature {
                params: method.param_types.clone(),
                return_type: Box::new(method.return_type.clone()),
            }));
        }
        self.error(
            format!("Class '{}' has no member '{}'", class_name, member),
            at,
        );
        Type::Void
    }

    fn type_of_method_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        class_ctx: Option<&str>,
        at: Position,
    ) -> Type {
        let callee_ty = self.type_of_expr(callee, class_ctx);
        let arg_types: Vec<Type> = args.iter().map(|a| self.type_of_expr(a, class_ctx)).collect();
        match callee_ty {
            Type::Function(sig) => {
                if sig.params.len() != arg_types.len() {
                    self.error(
                        format!(
                            "Expected {} argument(s), found {}",
                            sig.params.len(),
                            arg_types.len()
                        ),
                        at,
                    );
                } else {
                    for (expected, actual) in sig.params.iter().zip(arg_types.iter()) {
                        self.check_compatible(expected, actual, at, "call argument");
                    }
                }
                *sig.return_type
            }
            other => {
                self.error(format!("'{}' is not callable", other.name()), at);
                Type::Void
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Strict resolution for contexts where an unknown type name is a hard
    /// error (spec §7: "unknown type").
    fn resolve_type_name(&mut self, tn: &TypeName, at: Position) -> Type {
        let mut base = if let Some(p) = PrimitiveType::from_name(&tn.base) {
            Type::Primitive(p)
        } else {
            match tn.base.as_str() {
                "void" => Type::Void,
                "str" => Type::Str,
                "d_str" => Type::DStr,
                _ => {
                    if self.registry.has_class(&tn.base) {
                        Type::Class(tn.base.clone())
                    } else {
                        self.error(format!("Unknown type '{}'", tn.base), at);
                        Type::Void
                    }
                }
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

    /// Used while registering signatures before every class is known
    /// (interfaces, function signature pre-pass); doesn't emit "unknown
    /// type" diagnostics because a forward reference may still resolve.
    fn resolve_type_name_lenient(&self, tn: &TypeName) -> Type {
        let mut base = if let Some(p) = PrimitiveType::from_name(&tn.base) {
            Type::Primitive(p)
        } else {
            match tn.base.as_str() {
                "void" => Type::Void,
                "str" => Type::Str,
                "d_str" => Type::DStr,
                _ => Type::Class(tn.base.clone()),
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

    /// The compatibility rule of spec §4.4.
    fn check_compatible(&mut self, expected: &Type, actual: &Type, at: Position, what: &str) {
        if types_equal(expected, actual) {
            return;
        }
        match (expected, actual) {
            (Type::Pointer(_), Type::Null) => {}
            (Type::Str, Type::DStr) | (Type::DStr, Type::Str) => {}
            (Type::Primitive(a), Type::Primitive(b)) => {
                if b.rank() > a.rank() {
                    self.warn(
                        format!(
                            "Possible precision loss assigning '{}' to '{}' in {}",
                            actual.name(),
                            expected.name(),
                            what
                        ),
                        at,
                    );
                }
            }
            (Type::Pointer(a), Type::Pointer(b)) => {
                if let (Type::Class(sub), Type::Class(sup)) = (b.as_ref(), a.as_ref()) {
                    if !self.registry.is_subclass(sub, sup) {
                        self.error(
                            format!(
                                "Type mismatch in {}: expected '{}', found '{}'",
                                what,
                                expected.name(),
                                actual.name()
                            ),
                            at,
                        );
                    }
                } else if a.as_ref() != b.as_ref() {
                    self.error(
                        format!(
                            "Type mismatch in {}: expected '{}', found '{}'",
                            what,
                            expected.name(),
                            actual.name()
                        ),
                        at,
                    );
                }
            }
            _ => {
                self.error(
                    format!(
                        "Type mismatch in {}: expected '{}', found '{}'",
                        what,
                        expected.name(),
                        actual.name()
                    ),
                    at,
                );
            }
        }
    }
}

fn types_equal(a: &Type, b: &Type) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn analyze_src(src: &str) -> Result<AnalysisResult, SemanticError> {
        let tokens = lex(src).unwrap();
        let program = parse(tokens).unwrap();
        analyze(&program)
    }

    #[test]
    fn hospital_example_analyzes_cleanly() {
        let result = analyze_src(
            "class Hospital { private: var n: int = 35 public: method inc() -> void { n = n + 1; } } \
             function main() -> int { var h: Hospital* = Hospital.new(); h.inc(); h.clean(); return 0; }",
        );
        assert!(result.is_ok(), "{:?}", result.err().map(|e| e.to_string()));
    }

    #[test]
    fn duplicate_class_is_an_error() {
        let result = analyze_src("class A { } class A { }");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let result = analyze_src("function main() -> int { var x: Bogus = null; return 0; }");
        assert!(result.is_err());
    }

    #[test]
    fn vtable_prefix_is_preserved_across_override() {
        let result = analyze_src(
            "class A { public: method f() -> int { return 1; } } \
             class B extends A { public: method f() -> int { return 2; } } \
             function main() -> int { var b: B* = B.new(); b.clean(); return 0; }",
        )
        .unwrap();
        let a = result.registry.get_class("A").unwrap();
        let b = result.registry.get_class("B").unwrap();
        assert_eq!(a.vtable[0].method_name, "f");
        assert_eq!(b.vtable[0].method_name, "f");
        assert_eq!(b.vtable[0].owner_class, "B");
    }

    #[test]
    fn overriding_one_method_does_not_drop_an_unrelated_inherited_slot() {
        let result = analyze_src(
            "class A { public: method f() -> int { return 1; } method g() -> int { return 2; } } \
             class B extends A { public: method f() -> int { return 3; } } \
             function main() -> int { var b: B* = B.new(); b.clean(); return 0; }",
        )
        .unwrap();
        let b = result.registry.get_class("B").unwrap();
        assert_eq!(b.vtable.len(), 2);
        assert_eq!(b.vtable[0].method_name, "f");
        assert_eq!(b.vtable[0].owner_class, "B");
        assert_eq!(b.vtable[1].method_name, "g");
        assert_eq!(b.vtable[1].owner_class, "A");
    }

    #[test]
    fn subclass_inherits_parent_fields_ahead_of_its_own() {
        let result = analyze_src(
            "class A { public: var n: int = 1 } \
             class B extends A { public: var m: int = 2 } \
             function main() -> int { var b: B* = B.new(); b.clean(); return 0; }",
        )
        .unwrap();
        let a = result.registry.get_class("A").unwrap();
        let b = result.registry.get_class("B").unwrap();
        assert_eq!(b.fields.len(), 2);
        assert_eq!(b.fields[0].name, "n");
        assert_eq!(b.fields[1].name, "m");
        assert_eq!(b.struct_size, a.struct_size + 4);
    }

    #[test]
    fn subclass_pointer_is_compatible_with_superclass_pointer() {
        let result = analyze_src(
            "class A { } class B extends A { } \
             function main() -> int { var a: A* = B.new(); return 0; }",
        );
        assert!(result.is_ok(), "{:?}", result.err().map(|e| e.to_string()));
    }

    #[test]
    fn binary_addition_widens_to_wider_operand() {
        let result = analyze_src("function main() -> int { var x: long = 1 + 2; return 0; }");
        assert!(result.is_ok());
    }
}
