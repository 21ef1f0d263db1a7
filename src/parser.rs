//=============================================
// src/parser.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript recursive descent parser
// Objective: Transform token streams into AST nodes, enforcing operator
//            precedence and the type annotation grammar
//=============================================

//=============================================
//            Section 1: Parser State
//=============================================

use std::sync::Arc;

use crate::ast::{
    ArraySpec, AssignTarget, BinaryOp, Expr, FunctionDecl, Literal, Param, Program, ScreenDecl,
    ScreenVarDecl, Stmt, StorageClass, TypeAnnotation, UnaryOp,
};
use crate::error::{ScriptError, ScriptResult};
use crate::records::{FieldDef, RecordTypeDef};
use crate::tokenizer::{Token, TokenKind};
use crate::value::DataType;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> ScriptResult<Program> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.statement()?);
        }
        Ok(Program::new(statements))
    }

    /// Parse a single expression, used by the CLI's `--expr` flag.
    pub fn parse_expression_only(&mut self) -> ScriptResult<Expr> {
        let expr = self.expression()?;
        self.expect(&TokenKind::Eof, "end of expression")?;
        Ok(expr)
    }

    //=============================================
    //            Section 2: Statements
    //=============================================

    fn statement(&mut self) -> ScriptResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Var => self.var_decl(true),
            TokenKind::Const => self.var_decl(false),
            TokenKind::Print => self.print_stmt(),
            TokenKind::Function => self.function_decl(),
            TokenKind::Screen => self.screen_decl(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::Break => {
                let line = self.advance().line;
                self.expect_semicolon()?;
                Ok(Stmt::Break { line })
            }
            TokenKind::Continue => {
                let line = self.advance().line;
                self.expect_semicolon()?;
                Ok(Stmt::Continue { line })
            }
            TokenKind::Import => self.import_stmt(),
            TokenKind::Typeof => self.typedef_stmt(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::Do => self.do_while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Foreach => self.foreach_stmt(),
            _ => {
                let stmt = self.assignment_or_expr()?;
                self.expect_semicolon()?;
                Ok(stmt)
            }
        }
    }

    fn var_decl(&mut self, mutable: bool) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let name = self.expect_identifier("variable name")?;
        let ty = if self.match_kind(&TokenKind::Colon) {
            Some(self.type_annotation()?)
        } else {
            None
        };
        let init = if self.match_kind(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        if !mutable && init.is_none() {
            return Err(self.error_at(line, "Constant declarations require a value"));
        }
        self.expect_semicolon()?;
        Ok(Stmt::VarDecl {
            name,
            ty,
            init,
            mutable,
            line,
        })
    }

    fn print_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let mut args = Vec::new();
        if !self.check(&TokenKind::Semicolon) {
            args.push(self.expression()?);
            while self.match_kind(&TokenKind::Comma) {
                args.push(self.expression()?);
            }
        }
        self.expect_semicolon()?;
        Ok(Stmt::Print { args, line })
    }

    fn function_decl(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let name = self.expect_identifier("function name")?;
        self.expect(&TokenKind::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param_name = self.expect_identifier("parameter name")?;
                let ty = if self.match_kind(&TokenKind::Colon) {
                    Some(self.type_annotation()?)
                } else {
                    None
                };
                params.push(Param {
                    name: param_name,
                    ty,
                });
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' after parameters")?;
        let body = self.block()?;
        Ok(Stmt::FunctionDecl {
            decl: Arc::new(FunctionDecl {
                name,
                params,
                body,
                line,
            }),
        })
    }

    fn screen_decl(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let name = self.expect_identifier("screen name")?;
        self.expect(&TokenKind::LBrace, "'{' after screen name")?;
        let mut vars = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if !matches!(self.peek_kind(), TokenKind::Var | TokenKind::Const) {
                return Err(self.error_here("Screens may only contain variable declarations"));
            }
            let var_line = self.advance().line;
            let var_name = self.expect_identifier("variable name")?;
            let ty = if self.match_kind(&TokenKind::Colon) {
                Some(self.type_annotation()?)
            } else {
                None
            };
            let init = if self.match_kind(&TokenKind::Equal) {
                Some(self.expression()?)
            } else {
                None
            };
            self.expect_semicolon()?;
            vars.push(ScreenVarDecl {
                name: var_name,
                ty,
                init,
                line: var_line,
            });
        }
        self.expect(&TokenKind::RBrace, "'}' after screen body")?;
        Ok(Stmt::ScreenDecl {
            decl: Arc::new(ScreenDecl { name, vars, line }),
        })
    }

    fn return_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_semicolon()?;
        Ok(Stmt::Return { value, line })
    }

    fn import_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let path = match self.peek_kind().clone() {
            TokenKind::Str(path) => {
                self.advance();
                path
            }
            other => {
                return Err(self.error_here(&format!(
                    "Import expects a quoted path, found {}",
                    other
                )));
            }
        };
        self.expect_semicolon()?;
        Ok(Stmt::Import { path, line })
    }

    fn typedef_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let name = self.expect_identifier("type alias name")?;
        self.expect(&TokenKind::Colon, "':' after type alias name")?;
        let ty = self.type_annotation()?;
        self.expect_semicolon()?;
        Ok(Stmt::Typedef { name, ty, line })
    }

    fn if_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let condition = self.expression()?;
        self.match_kind(&TokenKind::Then);
        let then_branch = self.block()?;
        let else_branch = if self.match_kind(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            line,
        })
    }

    fn while_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let condition = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::While {
            condition,
            body,
            line,
        })
    }

    fn do_while_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let body = self.block()?;
        self.expect(&TokenKind::While, "'while' after do-block")?;
        let condition = self.expression()?;
        self.expect_semicolon()?;
        Ok(Stmt::DoWhile {
            body,
            condition,
            line,
        })
    }

    fn for_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let init = if matches!(self.peek_kind(), TokenKind::Var | TokenKind::Const) {
            let mutable = matches!(self.peek_kind(), TokenKind::Var);
            let decl_line = self.advance().line;
            let name = self.expect_identifier("variable name")?;
            let ty = if self.match_kind(&TokenKind::Colon) {
                Some(self.type_annotation()?)
            } else {
                None
            };
            self.expect(&TokenKind::Equal, "'=' in for-loop initializer")?;
            let value = self.expression()?;
            Stmt::VarDecl {
                name,
                ty,
                init: Some(value),
                mutable,
                line: decl_line,
            }
        } else {
            self.assignment_or_expr()?
        };
        self.expect_semicolon()?;
        let condition = self.expression()?;
        self.expect_semicolon()?;
        let update = self.assignment_or_expr()?;
        let body = self.block()?;
        Ok(Stmt::For {
            init: Box::new(init),
            condition,
            update: Box::new(update),
            body,
            line,
        })
    }

    fn foreach_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.advance().line;
        let variable = self.expect_identifier("loop variable")?;
        self.expect(&TokenKind::In, "'in' after loop variable")?;
        let iterable = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::Foreach {
            variable,
            iterable,
            body,
            line,
        })
    }

    /// Parse either an assignment (plain or compound) or a bare expression
    /// statement. Compound operators desugar to `lhs = lhs op rhs` here, so
    /// the evaluator only ever sees plain assignment.
    fn assignment_or_expr(&mut self) -> ScriptResult<Stmt> {
        let expr = self.expression()?;
        let line = expr.line();
        let compound: Option<BinaryOp> = match self.peek_kind() {
            TokenKind::Equal => None,
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Subtract),
            TokenKind::StarEqual => Some(BinaryOp::Multiply),
            TokenKind::SlashEqual => Some(BinaryOp::Divide),
            TokenKind::PercentEqual => Some(BinaryOp::Modulo),
            _ => return Ok(Stmt::ExprStmt { expr, line }),
        };
        self.advance();
        let rhs = self.expression()?;
        let target = self.to_assign_target(&expr)?;
        let value = match compound {
            Some(op) => Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(rhs),
                line,
            },
            None => rhs,
        };
        Ok(Stmt::Assign {
            target,
            value,
            line,
        })
    }

    fn to_assign_target(&self, expr: &Expr) -> ScriptResult<AssignTarget> {
        match expr {
            Expr::Variable { name, .. } => Ok(AssignTarget::Variable(name.clone())),
            Expr::Index { target, index, .. } => Ok(AssignTarget::Index {
                target: (**target).clone(),
                index: (**index).clone(),
            }),
            Expr::Member { target, field, .. } => Ok(AssignTarget::Member {
                target: (**target).clone(),
                field: field.clone(),
            }),
            other => Err(self.error_at(
                other.line(),
                "Invalid assignment target; expected a variable, index, or member",
            )),
        }
    }

    fn block(&mut self) -> ScriptResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error_here("Unterminated block"));
            }
            statements.push(self.statement()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(statements)
    }

    //=============================================
    //            Section 3: Type Annotations
    //=============================================

    fn type_annotation(&mut self) -> ScriptResult<TypeAnnotation> {
        match self.peek_kind().clone() {
            TokenKind::Sorted => {
                self.advance();
                self.expect(&TokenKind::TyMap, "'map' after 'sorted'")?;
                Ok(TypeAnnotation::Map { sorted: true })
            }
            TokenKind::TyMap => {
                self.advance();
                Ok(TypeAnnotation::Map { sorted: false })
            }
            TokenKind::TyRecord => {
                self.advance();
                let def = self.record_body()?;
                Ok(TypeAnnotation::Record(Arc::new(def)))
            }
            TokenKind::TyArray => {
                self.advance();
                self.array_annotation()
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(TypeAnnotation::Named(name))
            }
            other => match scalar_type(&other) {
                Some(dt) => {
                    self.advance();
                    Ok(TypeAnnotation::Scalar(dt))
                }
                None => Err(self.error_here(&format!("Expected a type, found {}", other))),
            },
        }
    }

    /// Everything after the `array` keyword: optional `.elem`, optional
    /// bracketed shape. `bitmap`/`intmap` select the packed leaf families.
    fn array_annotation(&mut self) -> ScriptResult<TypeAnnotation> {
        let (class, elem) = if self.match_kind(&TokenKind::Dot) {
            match self.peek_kind().clone() {
                TokenKind::TyBitmap => {
                    self.advance();
                    (StorageClass::PackedByte, DataType::Byte)
                }
                TokenKind::TyIntmap => {
                    self.advance();
                    (StorageClass::PackedInt, DataType::Int)
                }
                other => match scalar_type(&other) {
                    Some(dt) => {
                        self.advance();
                        (StorageClass::Fixed, dt)
                    }
                    None => {
                        return Err(
                            self.error_here(&format!("Expected array element type, found {}", other))
                        );
                    }
                },
            }
        } else {
            (StorageClass::Fixed, DataType::Any)
        };

        if !self.match_kind(&TokenKind::LBracket) {
            return Ok(TypeAnnotation::Array(ArraySpec {
                class: StorageClass::Dynamic,
                elem,
                dims: Vec::new(),
            }));
        }

        if self.check(&TokenKind::StarOp) {
            self.advance();
            self.expect(&TokenKind::RBracket, "']' after '*'")?;
            if matches!(class, StorageClass::PackedByte | StorageClass::PackedInt) {
                return Err(self.error_here("Packed arrays require a fixed shape"));
            }
            return Ok(TypeAnnotation::Array(ArraySpec {
                class: StorageClass::Dynamic,
                elem,
                dims: Vec::new(),
            }));
        }

        let mut dims = Vec::new();
        loop {
            match self.peek_kind().clone() {
                TokenKind::Int(n) if n > 0 => {
                    self.advance();
                    dims.push(n as usize);
                }
                other => {
                    return Err(self.error_here(&format!(
                        "Array dimensions must be positive integers, found {}",
                        other
                    )));
                }
            }
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']' after array shape")?;
        Ok(TypeAnnotation::Array(ArraySpec { class, elem, dims }))
    }

    /// Record type body: `{ name: type[prop, prop:value, ...], ... }`. The
    /// parenthesized property form is rejected; it reads as a call.
    fn record_body(&mut self) -> ScriptResult<RecordTypeDef> {
        self.expect(&TokenKind::LBrace, "'{' after 'record'")?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let name = self.expect_identifier("field name")?;
            self.expect(&TokenKind::Colon, "':' after field name")?;
            let ty = match scalar_type(&self.peek_kind().clone()) {
                Some(dt) => {
                    self.advance();
                    dt
                }
                None => {
                    return Err(self.error_here("Record fields take scalar types"));
                }
            };
            if self.check(&TokenKind::LParen) {
                return Err(self.error_here(
                    "Field properties use brackets, e.g. name: string[maxlength:5]; \
                     parentheses are ambiguous with call syntax",
                ));
            }
            let mut mandatory = false;
            let mut max_length = None;
            let mut default = None;
            if self.match_kind(&TokenKind::LBracket) {
                loop {
                    let prop = self.expect_identifier("field property")?;
                    match prop.as_str() {
                        "mandatory" => mandatory = true,
                        "maxlength" => {
                            self.expect(&TokenKind::Colon, "':' after maxlength")?;
                            match self.peek_kind().clone() {
                                TokenKind::Int(n) if n >= 0 => {
                                    self.advance();
                                    max_length = Some(n as usize);
                                }
                                other => {
                                    return Err(self.error_here(&format!(
                                        "maxlength expects an integer, found {}",
                                        other
                                    )));
                                }
                            }
                        }
                        "default" => {
                            self.expect(&TokenKind::Colon, "':' after default")?;
                            default = Some(self.literal_value()?);
                        }
                        other => {
                            return Err(self.error_here(&format!(
                                "Unknown field property '{}'",
                                other
                            )));
                        }
                    }
                    if !self.match_kind(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "']' after field properties")?;
            }
            fields.push(FieldDef {
                name: name.to_lowercase(),
                ty,
                mandatory,
                max_length,
                default,
            });
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}' after record fields")?;
        Ok(RecordTypeDef { fields })
    }

    fn literal_value(&mut self) -> ScriptResult<Literal> {
        let negative = self.match_kind(&TokenKind::Minus);
        let token = self.advance();
        let literal = match token.kind {
            TokenKind::Int(n) => Literal::Int(if negative { -n } else { n }),
            TokenKind::Long(n) => Literal::Long(if negative { -n } else { n }),
            TokenKind::Float(n) => Literal::Float(if negative { -n } else { n }),
            TokenKind::Double(n) => Literal::Double(if negative { -n } else { n }),
            TokenKind::Str(ref s) if !negative => Literal::Str(s.clone()),
            TokenKind::Date(d) if !negative => Literal::Date(d),
            TokenKind::True if !negative => Literal::Bool(true),
            TokenKind::False if !negative => Literal::Bool(false),
            TokenKind::Null if !negative => Literal::Null,
            ref other => {
                return Err(self.error_at(
                    token.line,
                    &format!("Expected a literal value, found {}", other),
                ));
            }
        };
        Ok(literal)
    }

    //=============================================
    //            Section 4: Expressions
    //=============================================

    fn expression(&mut self) -> ScriptResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.and_expr()?;
        while self.check(&TokenKind::Or) {
            let line = self.advance().line;
            let right = self.and_expr()?;
            expr = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.equality()?;
        while self.check(&TokenKind::And) {
            let line = self.advance().line;
            let right = self.equality()?;
            expr = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::NotEqual => BinaryOp::NotEqual,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.relational()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn relational(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.additive()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn additive(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.multiplicative()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.power()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::StarOp => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.power()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn power(&mut self) -> ScriptResult<Expr> {
        let base = self.unary()?;
        if self.check(&TokenKind::Caret) {
            let line = self.advance().line;
            let exponent = self.power()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Power,
                left: Box::new(base),
                right: Box::new(exponent),
                line,
            });
        }
        Ok(base)
    }

    fn unary(&mut self) -> ScriptResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let line = self.advance().line;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                line,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LBracket => {
                    let line = self.advance().line;
                    let index = self.expression()?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                        line,
                    };
                    // `a[i, j]` is sugar for `a[i][j]`, matching the
                    // comma-separated declaration shape.
                    while self.match_kind(&TokenKind::Comma) {
                        let next = self.expression()?;
                        expr = Expr::Index {
                            target: Box::new(expr),
                            index: Box::new(next),
                            line,
                        };
                    }
                    self.expect(&TokenKind::RBracket, "']' after index")?;
                }
                TokenKind::Dot => {
                    let line = self.advance().line;
                    let field = self.member_name()?;
                    // `name.member(...)` is a namespaced call, not member
                    // access; this covers functions like random.int whose
                    // second segment collides with a type keyword.
                    if self.check(&TokenKind::LParen) {
                        if let Expr::Variable { name, .. } = &expr {
                            let callee = format!("{}.{}", name, field);
                            expr = self.finish_call(callee, line)?;
                            continue;
                        }
                        return Err(self.error_at(line, "Only named functions can be called"));
                    }
                    expr = Expr::Member {
                        target: Box::new(expr),
                        field,
                        line,
                    };
                }
                TokenKind::LParen => {
                    let line = self.peek().line;
                    match &expr {
                        Expr::Variable { name, .. } => {
                            let callee = name.clone();
                            expr = self.finish_call(callee, line)?;
                        }
                        _ => {
                            return Err(self.error_at(line, "Only named functions can be called"));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, name: String, line: usize) -> ScriptResult<Expr> {
        self.expect(&TokenKind::LParen, "'(' to start arguments")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            args.push(self.expression()?);
            while self.match_kind(&TokenKind::Comma) {
                args.push(self.expression()?);
            }
        }
        self.expect(&TokenKind::RParen, "')' after arguments")?;
        Ok(Expr::Call { name, args, line })
    }

    fn member_name(&mut self) -> ScriptResult<String> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Identifier(name) => Ok(name.clone()),
            // Keyword and type tokens double as member names: `values.map`,
            // `row.date` and friends.
            kind if !token.lexeme.is_empty()
                && token.lexeme.chars().all(|c| c.is_ascii_alphabetic()) =>
            {
                let _ = kind;
                Ok(token.lexeme.to_lowercase())
            }
            other => Err(self.error_at(
                token.line,
                &format!("Expected a member name, found {}", other),
            )),
        }
    }

    fn primary(&mut self) -> ScriptResult<Expr> {
        let token = self.advance();
        let line = token.line;
        let expr = match token.kind {
            TokenKind::Int(n) => literal(Literal::Int(n), line),
            TokenKind::Long(n) => literal(Literal::Long(n), line),
            TokenKind::Float(n) => literal(Literal::Float(n), line),
            TokenKind::Double(n) => literal(Literal::Double(n), line),
            TokenKind::Str(s) => literal(Literal::Str(s), line),
            TokenKind::Date(d) => literal(Literal::Date(d), line),
            TokenKind::True => literal(Literal::Bool(true), line),
            TokenKind::False => literal(Literal::Bool(false), line),
            TokenKind::Null => literal(Literal::Null, line),

            TokenKind::Identifier(name) => {
                if self.check(&TokenKind::LParen) {
                    // The whole dotted name is the callee.
                    self.finish_call(name, line)?
                } else {
                    // A dotted identifier in value position is a member
                    // chain: `rec.name` reads field `name` of `rec`.
                    let mut segments = name.split('.');
                    let mut expr = Expr::Variable {
                        name: segments.next().expect("identifier").to_string(),
                        line,
                    };
                    for segment in segments {
                        expr = Expr::Member {
                            target: Box::new(expr),
                            field: segment.to_string(),
                            line,
                        };
                    }
                    expr
                }
            }

            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, "')' after expression")?;
                inner
            }

            TokenKind::LBracket => {
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    elements.push(self.expression()?);
                    while self.match_kind(&TokenKind::Comma) {
                        elements.push(self.expression()?);
                    }
                }
                self.expect(&TokenKind::RBracket, "']' after array literal")?;
                Expr::ArrayLiteral { elements, line }
            }

            TokenKind::LBrace => {
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        let key = self.map_key()?;
                        self.expect(&TokenKind::Colon, "':' after map key")?;
                        let value = self.expression()?;
                        entries.push((key, value));
                        if !self.match_kind(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBrace, "'}' after map literal")?;
                Expr::MapLiteral { entries, line }
            }

            other => {
                return Err(self.error_at(line, &format!("Unexpected token {}", other)));
            }
        };
        Ok(expr)
    }

    fn map_key(&mut self) -> ScriptResult<String> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Identifier(name) => Ok(name.clone()),
            TokenKind::Str(s) => Ok(s.clone()),
            kind if token.lexeme.chars().all(|c| c.is_ascii_alphabetic())
                && !token.lexeme.is_empty() =>
            {
                let _ = kind;
                Ok(token.lexeme.to_lowercase())
            }
            other => Err(self.error_at(
                token.line,
                &format!("Expected a map key, found {}", other),
            )),
        }
    }

    //=============================================
    //            Section 5: Token Helpers
    //=============================================

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.current.min(self.tokens.len() - 1)].clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ScriptResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("Expected {}, found {}", what, self.peek_kind())))
        }
    }

    fn expect_semicolon(&mut self) -> ScriptResult<()> {
        self.expect(&TokenKind::Semicolon, "';'")?;
        Ok(())
    }

    fn expect_identifier(&mut self, what: &str) -> ScriptResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(&format!("Expected {}, found {}", what, other))),
        }
    }

    fn error_here(&self, message: &str) -> ScriptError {
        self.error_at(self.peek().line, message)
    }

    fn error_at(&self, line: usize, message: &str) -> ScriptError {
        ScriptError::Parse {
            line,
            message: message.to_string(),
        }
    }
}

fn literal(value: Literal, line: usize) -> Expr {
    Expr::Literal { value, line }
}

fn scalar_type(kind: &TokenKind) -> Option<DataType> {
    match kind {
        TokenKind::TyByte => Some(DataType::Byte),
        TokenKind::TyInt => Some(DataType::Int),
        TokenKind::TyLong => Some(DataType::Long),
        TokenKind::TyFloat => Some(DataType::Float),
        TokenKind::TyDouble => Some(DataType::Double),
        TokenKind::TyString => Some(DataType::Str),
        TokenKind::TyDate => Some(DataType::Date),
        TokenKind::TyBool => Some(DataType::Bool),
        _ => None,
    }
}

//=============================================
//            Section 6: Tests
//=============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn parse_source(source: &str) -> ScriptResult<Program> {
        let tokens = Tokenizer::new(source).tokenize()?;
        Parser::new(tokens).parse()
    }

    fn parse_ok(source: &str) -> Program {
        parse_source(source).expect("parse")
    }

    fn parse_err(source: &str) -> ScriptError {
        parse_source(source).expect_err("expected parse error")
    }

    #[test]
    fn parses_typed_declarations() {
        let program = parse_ok(
            "var a: int = 1;\
             var b: array.string[5];\
             var c: array.bitmap[3, 3];\
             var d: sorted map = { x: 1 };\
             const e: double = 2.5;",
        );
        assert_eq!(program.statements.len(), 5);
        match &program.statements[2] {
            Stmt::VarDecl { ty: Some(TypeAnnotation::Array(spec)), .. } => {
                assert_eq!(spec.class, StorageClass::PackedByte);
                assert_eq!(spec.dims, vec![3, 3]);
            }
            other => panic!("expected bitmap declaration, got {:?}", other),
        }
        match &program.statements[3] {
            Stmt::VarDecl { ty: Some(TypeAnnotation::Map { sorted }), .. } => assert!(sorted),
            other => panic!("expected sorted map declaration, got {:?}", other),
        }
    }

    #[test]
    fn dynamic_array_uses_star() {
        let program = parse_ok("var xs: array.int[*];");
        match &program.statements[0] {
            Stmt::VarDecl { ty: Some(TypeAnnotation::Array(spec)), .. } => {
                assert_eq!(spec.class, StorageClass::Dynamic);
                assert!(spec.dims.is_empty());
            }
            other => panic!("expected dynamic array, got {:?}", other),
        }
    }

    #[test]
    fn multiplicative_tier_includes_modulo() {
        let program = parse_ok("var x = 1 + 4 % 3;");
        match &program.statements[0] {
            Stmt::VarDecl { init: Some(Expr::Binary { op, right, .. }), .. } => {
                assert_eq!(*op, BinaryOp::Add);
                match &**right {
                    Expr::Binary { op, .. } => assert_eq!(*op, BinaryOp::Modulo),
                    other => panic!("expected modulo on the right, got {:?}", other),
                }
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn compound_assignment_desugars() {
        let program = parse_ok("var x = 1; x += 2;");
        match &program.statements[1] {
            Stmt::Assign { target, value, .. } => {
                assert_eq!(*target, AssignTarget::Variable("x".into()));
                match value {
                    Expr::Binary { op: BinaryOp::Add, .. } => {}
                    other => panic!("expected desugared add, got {:?}", other),
                }
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn compound_assignment_needs_valid_target() {
        let err = parse_err("1 + 2 += 3;");
        match err {
            ScriptError::Parse { message, .. } => {
                assert!(message.contains("assignment target"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn index_and_member_targets_are_assignable() {
        let program = parse_ok("var g = [0]; g[0] = 1; var r = { a: 1 }; r.a = 2;");
        assert!(matches!(
            program.statements[1],
            Stmt::Assign { target: AssignTarget::Index { .. }, .. }
        ));
        assert!(matches!(
            program.statements[3],
            Stmt::Assign { target: AssignTarget::Member { .. }, .. }
        ));
    }

    #[test]
    fn record_type_with_bracketed_properties() {
        let program = parse_ok(
            "typeof person: record { id: int[mandatory], name: string[maxlength:5, default:\"none\"] };",
        );
        match &program.statements[0] {
            Stmt::Typedef { ty: TypeAnnotation::Record(def), .. } => {
                assert_eq!(def.fields.len(), 2);
                assert!(def.fields[0].mandatory);
                assert_eq!(def.fields[1].max_length, Some(5));
                assert_eq!(def.fields[1].default, Some(Literal::Str("none".into())));
            }
            other => panic!("expected record typedef, got {:?}", other),
        }
    }

    #[test]
    fn record_properties_reject_parenthesized_form() {
        let err = parse_err("typeof person: record { id: int(mandatory) };");
        match err {
            ScriptError::Parse { message, .. } => assert!(message.contains("brackets")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn dotted_call_names_survive() {
        let program = parse_ok("string.upper(\"a\"); random.int(1, 5);");
        match &program.statements[0] {
            Stmt::ExprStmt { expr: Expr::Call { name, .. }, .. } => {
                assert_eq!(name, "string.upper");
            }
            other => panic!("expected call, got {:?}", other),
        }
        match &program.statements[1] {
            Stmt::ExprStmt { expr: Expr::Call { name, args, .. }, .. } => {
                assert_eq!(name, "random.int");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn dotted_value_position_reads_members() {
        let program = parse_ok("var n = person.name;");
        match &program.statements[0] {
            Stmt::VarDecl { init: Some(Expr::Member { target, field, .. }), .. } => {
                assert_eq!(field, "name");
                assert!(matches!(**target, Expr::Variable { ref name, .. } if name == "person"));
            }
            other => panic!("expected member access, got {:?}", other),
        }
    }

    #[test]
    fn control_flow_statements_parse() {
        let program = parse_ok(
            "if x > 0 { print \"pos\"; } else if x < 0 { print \"neg\"; } else { print \"zero\"; }\
             while x > 0 { x -= 1; }\
             do { x += 1; } while x < 3;\
             for var i = 0; i < 10; i += 1 { print i; }\
             foreach item in xs { print item; }",
        );
        assert_eq!(program.statements.len(), 5);
    }

    #[test]
    fn screen_declaration_parses_variables_only() {
        let program = parse_ok("screen main { var title: string = \"hi\"; var n: int = 0; }");
        match &program.statements[0] {
            Stmt::ScreenDecl { decl } => {
                assert_eq!(decl.name, "main");
                assert_eq!(decl.vars.len(), 2);
            }
            other => panic!("expected screen declaration, got {:?}", other),
        }
        let err = parse_err("screen main { print \"no\"; }");
        assert!(matches!(err, ScriptError::Parse { .. }));
    }

    #[test]
    fn parse_error_carries_line() {
        let err = parse_err("var x = 1;\nvar = 2;");
        match err {
            ScriptError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn multi_index_desugars_to_nested_indexing() {
        let program = parse_ok("var x = grid[1, 2];");
        match &program.statements[0] {
            Stmt::VarDecl { init: Some(Expr::Index { target, .. }), .. } => {
                assert!(matches!(**target, Expr::Index { .. }));
            }
            other => panic!("expected nested index, got {:?}", other),
        }
    }

    #[test]
    fn power_binds_tighter_than_multiply() {
        let program = parse_ok("var x = 2 * 3 ^ 2;");
        match &program.statements[0] {
            Stmt::VarDecl { init: Some(Expr::Binary { op, .. }), .. } => {
                assert_eq!(*op, BinaryOp::Multiply);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
