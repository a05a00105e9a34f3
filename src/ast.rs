//! Abstract Syntax Tree for Sinter (spec §3).
//!
//! A closed sum of node kinds per grouping (top-level declarations, class
//! members, statements, expressions). Built once by the parser and never
//! mutated afterwards except to attach resolved type information during
//! semantic analysis (spec §3 Lifecycles).

use crate::error::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Class(ClassDeclaration),
    Interface(InterfaceDeclaration),
    Function(FunctionDeclaration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDeclaration {
    pub name: String,
    pub type_params: Vec<String>,
    pub base: Option<String>,
    pub interfaces: Vec<String>,
    pub members: Vec<ClassMember>,
    pub at: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDeclaration {
    pub name: String,
    pub methods: Vec<MethodSignature>,
    pub at: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeName,
    pub at: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: TypeName,
}

/// A type as written in source: a base name followed by zero or more `*`
/// pointer suffixes (spec §4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub base: String,
    pub pointer_depth: usize,
    pub array: Option<Option<usize>>,
}

impl TypeName {
    pub fn simple(base: impl Into<String>) -> Self {
        TypeName {
            base: base.into(),
            pointer_depth: 0,
            array: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Visibility {
    Private,
    Protected,
    Public,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Field(FieldDeclaration),
    Method(MethodDeclaration),
    /// A `private:`/`protected:`/`public:` block; collapsed into per-member
    /// visibility during semantic analysis (spec §3).
    Scope(Visibility, Vec<ClassMember>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldAttributes {
    pub read_only: bool,
    pub write_only: bool,
    pub derived: bool,
    pub serializable: bool,
}

impl Default for FieldAttributes {
    fn default() -> Self {
        FieldAttributes {
            read_only: false,
            write_only: false,
            derived: false,
            serializable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclaration {
    pub name: String,
    pub type_name: TypeName,
    pub is_const: bool,
    pub initializer: Option<Expr>,
    pub attributes: Option<FieldAttributes>,
    pub at: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDeclaration {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeName,
    pub body: Block,
    pub is_static: bool,
    pub at: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeName,
    pub body: Block,
    pub at: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Block(Block),
    VariableDeclaration {
        name: String,
        type_name: TypeName,
        is_const: bool,
        initializer: Option<Expr>,
        at: Position,
    },
    Expression(Expr),
    Assignment {
        target: Expr,
        value: Expr,
        at: Position,
    },
    Return {
        value: Option<Expr>,
        at: Position,
    },
    If {
        condition: Expr,
        then_block: Block,
        else_block: Option<Block>,
        at: Position,
    },
    While {
        condition: Expr,
        body: Block,
        at: Position,
    },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Expr>,
        update: Option<Box<Statement>>,
        body: Block,
        at: Position,
    },
    ForEach {
        var_name: String,
        var_type: TypeName,
        collection: Expr,
        body: Block,
        at: Position,
    },
    Break(Position),
    Continue(Position),
    Print {
        args: Vec<Expr>,
        newline: bool,
        at: Position,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Integer,
    Float,
    Boolean,
    String,
    DString,
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    /// Raw D-string template text, e.g. `"count is {c}"`, placeholders
    /// un-expanded (spec §4.6.1 parses this at code-gen time).
    DString(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Deref,
    AddrOf,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: LiteralValue,
        kind: LiteralKind,
        at: Position,
    },
    Identifier {
        name: String,
        at: Position,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        at: Position,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        at: Position,
    },
    MemberAccess {
        object: Box<Expr>,
        member: String,
        at: Position,
    },
    MethodCall {
        callee: Box<Expr>,
        args: Vec<Expr>,
        at: Position,
    },
    New {
        class_name: String,
        type_args: Vec<TypeName>,
        args: Vec<Expr>,
        at: Position,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
        at: Position,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
        at: Position,
    },
}

impl Expr {
    pub fn position(&self) -> Position {
        match self {
            Expr::Literal { at, .. }
            | Expr::Identifier { at, .. }
            | Expr::Binary { at, .. }
            | Expr::Unary { at, .. }
            | Expr::MemberAccess { at, .. }
            | Expr::MethodCall { at, .. }
            | Expr::New { at, .. }
            | Expr::ArrayLiteral { at, .. }
            | Expr::ArrayAccess { at, .. } => *at,
        }
    }

    /// True iff this expression is a heap allocation in the sense the
    /// pointer-cleanup validator cares about: a `new` expression, or a call
    /// to `ClassName.new` (spec §4.5).
    pub fn is_allocation(&self) -> bool {
        match self {
            Expr::New { .. } => true,
            Expr::MethodCall { callee, .. } => matches!(
                callee.as_ref(),
                Expr::MemberAccess { member, .. } if member == "new"
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_name_simple_has_no_pointer_depth() {
        let t = TypeName::simple("int");
        assert_eq!(t.pointer_depth, 0);
        assert_eq!(t.array, None);
    }

    #[test]
    fn new_expression_is_an_allocation() {
        let at = Position::new(1, 1);
        let e = Expr::New {
            class_name: "Hospital".to_string(),
            type_args: vec![],
            args: vec![],
            at,
        };
        assert!(e.is_allocation());
    }

    #[test]
    fn class_dot_new_call_is_an_allocation() {
        let at = Position::new(1, 1);
        let callee = Expr::MemberAccess {
            object: Box::new(Expr::Identifier {
                name: "Hospital".to_string(),
                at,
            }),
            member: "new".to_string(),
            at,
        };
        let call = Expr::MethodCall {
            callee: Box::new(callee),
            args: vec![],
            at,
        };
        assert!(call.is_allocation());
    }

    #[test]
    fn plain_method_call_is_not_an_allocation() {
        let at = Position::new(1, 1);
        let callee = Expr::MemberAccess {
            object: Box::new(Expr::Identifier {
                name: "h".to_string(),
                at,
            }),
            member: "inc".to_string(),
            at,
        };
        let call = Expr::MethodCall {
            callee: Box::new(callee),
            args: vec![],
            at,
        };
        assert!(!call.is_allocation());
    }
}
