//! Recursive-descent parser with precedence climbing for expressions
//! (spec §4.2). Fail-fast: the first unexpected token aborts the parse
//! with its line/column attached; there is no error recovery (spec §1
//! Non-goals).

use crate::ast::*;
use crate::error::{ParseError, Position};
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).parse_program()
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn position(&self) -> Position {
        self.peek().position()
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("{:?}", kind)))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        ParseError {
            message: format!(
                "Unexpected token '{}' ({:?}), expected {}",
                tok.lexeme, tok.kind, expected
            ),
            at: tok.position(),
        }
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut declarations = Vec::new();
        while !self.check(&TokenKind::Eof) {
            declarations.push(self.parse_declaration()?);
        }
        Ok(Program { declarations })
    }

    fn parse_declaration(&mut self) -> PResult<Declaration> {
        // `abstract` is accepted but carries no semantic effect (see
        // DESIGN.md's Open Question decision).
        self.matches(&TokenKind::Abstract);
        match self.peek_kind() {
            TokenKind::Class => Ok(Declaration::Class(self.parse_class()?)),
            TokenKind::Interface => Ok(Declaration::Interface(self.parse_interface()?)),
            TokenKind::Function => Ok(Declaration::Function(self.parse_function()?)),
            _ => Err(self.unexpected("a class, interface, or function declaration")),
        }
    }

    fn parse_class(&mut self) -> PResult<ClassDeclaration> {
        let at = self.position();
        self.expect(TokenKind::Class)?;
        let name = self.expect_identifier()?;

        let mut type_params = Vec::new();
        if self.matches(&TokenKind::Parametrized) {
            self.expect(TokenKind::LParen)?;
            if !self.check(&TokenKind::RParen) {
                loop {
                    type_params.push(self.expect_identifier()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
        }

        let base = if self.matches(&TokenKind::Extends) {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        let mut interfaces = Vec::new();
        if self.matches(&TokenKind::Implements) {
            loop {
                interfaces.push(self.expect_identifier()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            members.push(self.parse_class_member()?);
        }
        self.expect(TokenKind::RBrace)?;

        Ok(ClassDeclaration {
            name,
            type_params,
            base,
            interfaces,
            members,
            at,
        })
    }

    fn parse_interface(&mut self) -> PResult<InterfaceDeclaration> {
        let at = self.position();
        self.expect(TokenKind::Interface)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            methods.push(self.parse_method_signature()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(InterfaceDeclaration { name, methods, at })
    }

    fn parse_method_signature(&mut self) -> PResult<MethodSignature> {
        let at = self.position();
        self.expect(TokenKind::Method)?;
        let name = self.expect_identifier()?;
        let params = self.parse_params()?;
        self.expect(TokenKind::Arrow)?;
        let return_type = self.parse_type_name()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(MethodSignature {
            name,
            params,
            return_type,
            at,
        })
    }

    fn parse_function(&mut self) -> PResult<FunctionDeclaration> {
        let at = self.position();
        self.expect(TokenKind::Function)?;
        let name = self.expect_identifier()?;
        let params = self.parse_params()?;
        self.expect(TokenKind::Arrow)?;
        let return_type = self.parse_type_name()?;
        let body = self.parse_block()?;
        Ok(FunctionDeclaration {
            name,
            params,
            return_type,
            body,
            at,
        })
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let name = self.expect_identifier()?;
                self.expect(TokenKind::Colon)?;
                let type_name = self.parse_type_name()?;
                params.push(Param { name, type_name });
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    /// A base name (identifier or primitive keyword) followed by zero or
    /// more `*` pointer suffixes, or an array suffix `[]`/`[N]` (spec §4.2).
    fn parse_type_name(&mut self) -> PResult<TypeName> {
        let base = match self.peek_kind().clone() {
            TokenKind::IntType => {
                self.advance();
                "int".to_string()
            }
            TokenKind::FloatType => {
                self.advance();
                "float".to_string()
            }
            TokenKind::DoubleType => {
                self.advance();
                "double".to_string()
            }
            TokenKind::BooleanType => {
                self.advance();
                "boolean".to_string()
            }
            TokenKind::StrType => {
                self.advance();
                "str".to_string()
            }
            TokenKind::VoidType => {
                self.advance();
                "void".to_string()
            }
            TokenKind::Identifier => self.expect_identifier()?,
            _ => return Err(self.unexpected("a type name")),
        };
        let mut pointer_depth = 0;
        while self.matches(&TokenKind::Star) {
            pointer_depth += 1;
        }
        let mut array = None;
        if self.matches(&TokenKind::LBracket) {
            if self.check(&TokenKind::IntLiteral) {
                let tok = self.advance();
                let n: usize = tok
                    .lexeme
                    .parse()
                    .map_err(|_| ParseError { message: "Invalid array size".to_string(), at: tok.position() })?;
                array = Some(Some(n));
            } else {
                array = Some(None);
            }
            self.expect(TokenKind::RBracket)?;
        }
        Ok(TypeName {
            base,
            pointer_depth,
            array,
        })
    }

    fn expect_identifier(&mut self) -> PResult<String> {
        if self.check(&TokenKind::Identifier) {
            Ok(self.advance().lexeme)
        } else {
            Err(self.unexpected("an identifier"))
        }
    }

    // ------------------------------------------------------------------
    // Class members
    // ------------------------------------------------------------------

    fn parse_class_member(&mut self) -> PResult<ClassMember> {
        let visibility = match self.peek_kind() {
            TokenKind::Private => Some(Visibility::Private),
            TokenKind::Protected => Some(Visibility::Protected),
            TokenKind::Public => Some(Visibility::Public),
            _ => None,
        };
        if let Some(vis) = visibility {
            self.advance();
            self.expect(TokenKind::Colon)?;
            let mut members = Vec::new();
            while !matches!(
                self.peek_kind(),
                TokenKind::Private | TokenKind::Protected | TokenKind::Public | TokenKind::RBrace
            ) {
                members.push(self.parse_bare_member()?);
            }
            return Ok(ClassMember::Scope(vis, members));
        }
        self.parse_bare_member()
    }

    fn parse_bare_member(&mut self) -> PResult<ClassMember> {
        // An annotation preceding a field or method: `@attr(...)` for
        // fields, `@static` for methods (spec §4.1: annotations are a
        // generic lexical construct; `static` is not a reserved keyword).
        let mut annotation = None;
        if self.check(&TokenKind::Annotation) {
            annotation = Some(self.advance().lexeme);
        }

        match self.peek_kind() {
            TokenKind::Var | TokenKind::Const => {
                Ok(ClassMember::Field(self.parse_field(annotation)?))
            }
            TokenKind::Method => Ok(ClassMember::Method(self.parse_method(annotation)?)),
            _ => Err(self.unexpected("a field or method declaration")),
        }
    }

    fn parse_field(&mut self, annotation: Option<String>) -> PResult<FieldDeclaration> {
        let at = self.position();
        let is_const = self.matches(&TokenKind::Const);
        if !is_const {
            self.expect(TokenKind::Var)?;
        }
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Colon)?;
        let type_name = self.parse_type_name()?;
        let initializer = if self.matches(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        // Field declarations may omit their trailing semicolon (spec §4.2).
        self.matches(&TokenKind::Semicolon);
        Ok(FieldDeclaration {
            name,
            type_name,
            is_const,
            initializer,
            attributes: annotation.map(|a| parse_attribute_annotation(&a)),
            at,
        })
    }

    fn parse_method(&mut self, annotation: Option<String>) -> PResult<MethodDeclaration> {
        let at = self.position();
        self.expect(TokenKind::Method)?;
        let name = self.expect_identifier()?;
        let params = self.parse_params()?;
        self.expect(TokenKind::Arrow)?;
        let return_type = self.parse_type_name()?;
        let body = self.parse_block()?;
        let is_static = annotation.as_deref() == Some("@static");
        Ok(MethodDeclaration {
            name,
            params,
            return_type,
            body,
            is_static,
            at,
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> PResult<Block> {
        self.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> PResult<Statement> {
        match self.peek_kind() {
            TokenKind::LBrace => Ok(Statement::Block(self.parse_block()?)),
            TokenKind::Var | TokenKind::Const => self.parse_variable_declaration(),
            TokenKind::Return => self.parse_return(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                let at = self.position();
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Break(at))
            }
            TokenKind::Continue => {
                let at = self.position();
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Continue(at))
            }
            TokenKind::Print | TokenKind::Println => self.parse_print(),
            _ => self.parse_expression_or_assignment_statement(),
        }
    }

    fn parse_variable_declaration(&mut self) -> PResult<Statement> {
        let at = self.position();
        let is_const = self.matches(&TokenKind::Const);
        if !is_const {
            self.expect(TokenKind::Var)?;
        }
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Colon)?;
        let type_name = self.parse_type_name()?;
        let initializer = if self.matches(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::VariableDeclaration {
            name,
            type_name,
            is_const,
            initializer,
            at,
        })
    }

    fn parse_return(&mut self) -> PResult<Statement> {
        let at = self.position();
        self.expect(TokenKind::Return)?;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Return { value, at })
    }

    fn parse_if(&mut self) -> PResult<Statement> {
        let at = self.position();
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_block = self.parse_block()?;
        let else_block = if self.matches(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(Block {
                    statements: vec![self.parse_if()?],
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_block,
            else_block,
            at,
        })
    }

    fn parse_while(&mut self) -> PResult<Statement> {
        let at = self.position();
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Statement::While {
            condition,
            body,
            at,
        })
    }

    /// Disambiguates classic C-style `for (init; cond; update)` from
    /// `for (name: Type in collection)` by looking for `in` before the
    /// first `;` (spec §3's ForStatement vs ForEachStatement).
    fn parse_for(&mut self) -> PResult<Statement> {
        let at = self.position();
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        if self.check(&TokenKind::Identifier) && self.peek_ahead_is_foreach() {
            let var_name = self.expect_identifier()?;
            self.expect(TokenKind::Colon)?;
            let var_type = self.parse_type_name()?;
            self.expect(TokenKind::In)?;
            let collection = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            let body = self.parse_block()?;
            return Ok(Statement::ForEach {
                var_name,
                var_type,
                collection,
                body,
                at,
            });
        }

        let init = if self.check(&TokenKind::Semicolon) {
            self.advance();
            None
        } else {
            let stmt = if matches!(self.peek_kind(), TokenKind::Var | TokenKind::Const) {
                self.parse_variable_declaration()?
            } else {
                self.parse_expression_or_assignment_statement()?
            };
            Some(Box::new(stmt))
        };
        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_bare_assignment_or_expr()?))
        };
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Statement::For {
            init,
            condition,
            update,
            body,
            at,
        })
    }

    /// Look ahead past `identifier :` for an `in` token before hitting a
    /// `;`, `)`, `=`, distinguishing a foreach header from a C-style one.
    fn peek_ahead_is_foreach(&self) -> bool {
        let mut i = self.pos;
        if !matches!(self.tokens.get(i).map(|t| &t.kind), Some(TokenKind::Identifier)) {
            return false;
        }
        i += 1;
        if !matches!(self.tokens.get(i).map(|t| &t.kind), Some(TokenKind::Colon)) {
            return false;
        }
        i += 1;
        // skip a type name: base + any `*`/`[]`
        if self.tokens.get(i).is_none() {
            return false;
        }
        i += 1;
        loop {
            match self.tokens.get(i).map(|t| &t.kind) {
                Some(TokenKind::Star) => i += 1,
                Some(TokenKind::LBracket) => {
                    i += 1;
                    while !matches!(self.tokens.get(i).map(|t| &t.kind), Some(TokenKind::RBracket) | None) {
                        i += 1;
                    }
                    i += 1;
                }
                _ => break,
            }
        }
        matches!(self.tokens.get(i).map(|t| &t.kind), Some(TokenKind::In))
    }

    fn parse_print(&mut self) -> PResult<Statement> {
        let at = self.position();
        let newline = self.check(&TokenKind::Println);
        self.advance();
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Print { args, newline, at })
    }

    /// A bare statement with no trailing semicolon expected (used inside a
    /// `for (...)` update clause).
    fn parse_bare_assignment_or_expr(&mut self) -> PResult<Statement> {
        let at = self.position();
        let expr = self.parse_expr()?;
        if let Some(assign_op) = self.peek_compound_assign() {
            self.advance();
            let value = self.parse_expr()?;
            let value = desugar_compound(assign_op, expr.clone(), value);
            return Ok(Statement::Assignment {
                target: expr,
                value,
                at,
            });
        }
        Ok(Statement::Expression(expr))
    }

    fn parse_expression_or_assignment_statement(&mut self) -> PResult<Statement> {
        let stmt = self.parse_bare_assignment_or_expr()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(stmt)
    }

    fn peek_compound_assign(&self) -> Option<Option<BinaryOp>> {
        match self.peek_kind() {
            TokenKind::Eq => Some(None),
            TokenKind::PlusEq => Some(Some(BinaryOp::Add)),
            TokenKind::MinusEq => Some(Some(BinaryOp::Sub)),
            TokenKind::SlashEq => Some(Some(BinaryOp::Div)),
            TokenKind::PercentEq => Some(Some(BinaryOp::Mod)),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Expressions: precedence climbing over the ten levels of spec §4.2.
    // ------------------------------------------------------------------

    /// Level 1 (assignment) never appears inside `Expr` itself — the AST
    /// models assignment as a `Statement`, so parsing an expression starts
    /// at level 2 (logical or); `parse_bare_assignment_or_expr` is what
    /// recognizes the trailing `=`/`+=`/... and builds `Statement::Assignment`.
    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_logical_and()?;
        while self.check(&TokenKind::OrOr) {
            let at = self.position();
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                at,
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(&TokenKind::AndAnd) {
            let at = self.position();
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                at,
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let at = self.position();
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                at,
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            let at = self.position();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                at,
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let at = self.position();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                at,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let at = self.position();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                at,
            };
        }
        Ok(left)
    }

    /// Level 8: unary prefix `! - * &`, plus prefix `++`/`--`. `*`/`&` here
    /// are pointer dereference/address-of, disambiguated from the binary
    /// multiplicative/bitwise-and operators purely by parser position, per
    /// spec §4.1.
    fn parse_unary(&mut self) -> PResult<Expr> {
        let at = self.position();
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                at,
            });
        }
        self.parse_postfix()
    }

    /// Level 9: `.member`, `(args)`, `[index]`, postfix `++`/`--`.
    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let at = self.position();
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_identifier()?;
                    expr = Expr::MemberAccess {
                        object: Box::new(expr),
                        member,
                        at,
                    };
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    expr = Expr::MethodCall {
                        callee: Box::new(expr),
                        args,
                        at,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::ArrayAccess {
                        array: Box::new(expr),
                        index: Box::new(index),
                        at,
                    };
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    expr = Expr::Unary {
                        op: UnaryOp::PostInc,
                        operand: Box::new(expr),
                        at,
                    };
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    expr = Expr::Unary {
                        op: UnaryOp::PostDec,
                        operand: Box::new(expr),
                        at,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    /// Level 10: literals, identifiers, `new`, `(expr)`, `[…]` array literal.
    fn parse_primary(&mut self) -> PResult<Expr> {
        let at = self.position();
        match self.peek_kind().clone() {
            TokenKind::IntLiteral => {
                let tok = self.advance();
                let value = tok.lexeme.parse::<i64>().map_err(|_| ParseError {
                    message: format!("Invalid integer literal '{}'", tok.lexeme),
                    at: tok.position(),
                })?;
                Ok(Expr::Literal {
                    value: LiteralValue::Integer(value),
                    kind: LiteralKind::Integer,
                    at,
                })
            }
            TokenKind::FloatLiteral => {
                let tok = self.advance();
                let value = tok.lexeme.parse::<f64>().map_err(|_| ParseError {
                    message: format!("Invalid float literal '{}'", tok.lexeme),
                    at: tok.position(),
                })?;
                Ok(Expr::Literal {
                    value: LiteralValue::Float(value),
                    kind: LiteralKind::Float,
                    at,
                })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal {
                    value: LiteralValue::Boolean(true),
                    kind: LiteralKind::Boolean,
                    at,
                })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal {
                    value: LiteralValue::Boolean(false),
                    kind: LiteralKind::Boolean,
                    at,
                })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal {
                    value: LiteralValue::Null,
                    kind: LiteralKind::Null,
                    at,
                })
            }
            TokenKind::StringLiteral => {
                let tok = self.advance();
                Ok(Expr::Literal {
                    value: LiteralValue::String(tok.lexeme),
                    kind: LiteralKind::String,
                    at,
                })
            }
            TokenKind::DStringLiteral => {
                let tok = self.advance();
                Ok(Expr::Literal {
                    value: LiteralValue::DString(tok.lexeme),
                    kind: LiteralKind::DString,
                    at,
                })
            }
            TokenKind::This | TokenKind::SelfKw => {
                self.advance();
                Ok(Expr::Identifier {
                    name: "this".to_string(),
                    at,
                })
            }
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                Ok(Expr::Identifier { name, at })
            }
            TokenKind::New => {
                self.advance();
                let class_name = self.expect_identifier()?;
                let mut type_args = Vec::new();
                if self.matches(&TokenKind::Lt) {
                    if !self.check(&TokenKind::Gt) {
                        loop {
                            type_args.push(self.parse_type_name()?);
                            if !self.matches(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::Gt)?;
                }
                let args = self.parse_arguments()?;
                Ok(Expr::New {
                    class_name,
                    type_args,
                    args,
                    at,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::ArrayLiteral { elements, at })
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

fn desugar_compound(op: Option<BinaryOp>, target: Expr, value: Expr) -> Expr {
    match op {
        None => value,
        Some(op) => {
            let at = target.position();
            Expr::Binary {
                op,
                left: Box::new(target),
                right: Box::new(value),
                at,
            }
        }
    }
}

/// Parses `@attr(readOnly=true, writeOnly=false, derived=false,
/// serializable=true)`-style annotation text into the four booleans the
/// AST's FieldAttributes carries (spec §3).
fn parse_attribute_annotation(text: &str) -> FieldAttributes {
    let mut attrs = FieldAttributes::default();
    let Some(open) = text.find('(') else {
        return attrs;
    };
    let Some(close) = text.rfind(')') else {
        return attrs;
    };
    let body = &text[open + 1..close];
    for pair in body.split(',') {
        let pair = pair.trim();
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim() == "true";
        match key {
            "readOnly" => attrs.read_only = value,
            "writeOnly" => attrs.write_only = value,
            "derived" => attrs.derived = value,
            "serializable" => attrs.serializable = value,
            _ => {}
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> Program {
        parse(lex(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_hospital_example_from_spec() {
        let program = parse_src(
            "class Hospital { private: var n: int = 35 public: method inc() -> void { n = n + 1; } }",
        );
        assert_eq!(program.declarations.len(), 1);
        let Declaration::Class(class) = &program.declarations[0] else {
            panic!("expected a class declaration");
        };
        assert_eq!(class.name, "Hospital");
        assert_eq!(class.members.len(), 2);
    }

    #[test]
    fn parses_function_with_dstring_and_println() {
        let program = parse_src(
            r#"function main() -> int { var c: int = 0; var m: str = D"count is {c}"; println(m); c = 5; println(m); return 0; }"#,
        );
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(f.name, "main");
        assert_eq!(f.body.statements.len(), 5);
    }

    #[test]
    fn parses_extends_and_vtable_scenario() {
        let program = parse_src(
            "class A { public: method f() -> int { return 1; } } \
             class B extends A { public: method f() -> int { return 2; } } \
             function main() -> int { var b: B* = B.new(); b.clean(); return 0; }",
        );
        assert_eq!(program.declarations.len(), 3);
        let Declaration::Class(b) = &program.declarations[1] else {
            panic!("expected class B");
        };
        assert_eq!(b.base.as_deref(), Some("A"));
    }

    #[test]
    fn precedence_binds_multiplicative_tighter_than_additive() {
        let program = parse_src("function main() -> boolean { return 1 + 2 == 3; } ");
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!();
        };
        let Statement::Return { value: Some(expr), .. } = &f.body.statements[0] else {
            panic!();
        };
        let Expr::Binary { op: BinaryOp::Eq, left, .. } = expr else {
            panic!("expected top-level == comparison");
        };
        assert!(matches!(**left, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn unexpected_token_reports_position() {
        let err = parse(lex("class").unwrap()).unwrap_err();
        assert!(err.message.contains("Unexpected token"));
    }

    #[test]
    fn pointer_type_suffix_parses() {
        let program = parse_src("function main() -> int { var h: Hospital* = null; return 0; }");
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!();
        };
        let Statement::VariableDeclaration { type_name, .. } = &f.body.statements[0] else {
            panic!();
        };
        assert_eq!(type_name.pointer_depth, 1);
        assert_eq!(type_name.base, "Hospital");
    }
}
