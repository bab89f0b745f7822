//! Recursive-descent parser for Basalt
//!
//! Produces the surface AST of [`crate::ast`]. The grammar is
//! semicolon-separated at the top level and inside braces; there is no
//! layout rule. Binary operators are parsed by precedence climbing with
//! the usual Haskell precedences.

use crate::ast::{
    Builtin, ConstructorDef, Decl, Definition, Equation, Expr, Literal, Pattern, Program, Span,
    TypeExpr,
};
use crate::lexer::{SpannedToken, Token};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unexpected token {found:?}, expected {expected}")]
    UnexpectedToken {
        found: Token,
        expected: String,
        span: Span,
    },
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(String),
    #[error("definition left-hand side must be a lowercase name")]
    BadDefinitionHead(Span),
}

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut decls = Vec::new();
        self.skip_semicolons();
        while !self.check(&Token::Eof) {
            decls.push(self.parse_decl()?);
            // Declarations are separated by one or more semicolons
            if self.check(&Token::Semicolon) {
                self.skip_semicolons();
            } else if !self.check(&Token::Eof) {
                return Err(self.unexpected("`;` between declarations"));
            }
        }
        Ok(Program { decls })
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_decl(&mut self) -> Result<Decl, ParseError> {
        if self.check(&Token::Data) {
            self.parse_data()
        } else {
            Ok(Decl::Value(self.parse_definition()?))
        }
    }

    fn parse_data(&mut self) -> Result<Decl, ParseError> {
        let start = self.current_span().start;
        self.expect(Token::Data, "`data`")?;
        let name = self.expect_upper("a type name")?;
        let mut params = Vec::new();
        while let Token::Ident(_) = self.peek() {
            params.push(self.expect_ident("a type parameter")?);
        }
        self.expect(Token::Eq, "`=`")?;

        let mut constructors = vec![self.parse_constructor_def()?];
        while self.check(&Token::Pipe) {
            self.advance();
            constructors.push(self.parse_constructor_def()?);
        }

        let end = self.previous_span().end;
        Ok(Decl::Data {
            name,
            params,
            constructors,
            span: Span::new(start, end),
        })
    }

    fn parse_constructor_def(&mut self) -> Result<ConstructorDef, ParseError> {
        let name = self.expect_upper("a constructor name")?;
        let mut fields = Vec::new();
        while self.starts_atom_type() {
            fields.push(self.parse_atom_type()?);
        }
        Ok(ConstructorDef { name, fields })
    }

    fn parse_definition(&mut self) -> Result<Definition, ParseError> {
        let start = self.current_span().start;
        let name = match self.peek().clone() {
            Token::Ident(n) => {
                self.advance();
                n
            }
            _ => return Err(self.unexpected("a definition")),
        };

        if self.check(&Token::DoubleColon) {
            self.advance();
            let ty = self.parse_type()?;
            let end = self.previous_span().end;
            return Ok(Definition::Annotation(name, ty, Span::new(start, end)));
        }

        let mut patterns = Vec::new();
        while self.starts_atom_pattern() {
            patterns.push(self.parse_atom_pattern()?);
        }
        self.expect(Token::Eq, "`=`")?;
        let body = self.parse_expr()?;
        let end = self.previous_span().end;
        Ok(Definition::Equation(Equation {
            name,
            patterns,
            body,
            span: Span::new(start, end),
        }))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let lhs = self.parse_applied_type()?;
        if self.check(&Token::Arrow) {
            self.advance();
            let rhs = self.parse_type()?;
            Ok(TypeExpr::Function(Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn parse_applied_type(&mut self) -> Result<TypeExpr, ParseError> {
        match self.peek().clone() {
            Token::UpperIdent(name) if !is_base_type(&name) => {
                self.advance();
                let mut args = Vec::new();
                while self.starts_atom_type() {
                    args.push(self.parse_atom_type()?);
                }
                Ok(TypeExpr::Named(name, args))
            }
            _ => self.parse_atom_type(),
        }
    }

    fn parse_atom_type(&mut self) -> Result<TypeExpr, ParseError> {
        match self.peek().clone() {
            Token::UpperIdent(name) => {
                self.advance();
                Ok(match name.as_str() {
                    "Int" => TypeExpr::Int,
                    "String" => TypeExpr::Str,
                    "Bool" => TypeExpr::Bool,
                    _ => TypeExpr::Named(name, Vec::new()),
                })
            }
            Token::Ident(v) => {
                self.advance();
                Ok(TypeExpr::Var(v))
            }
            Token::LParen => {
                self.advance();
                let ty = self.parse_type()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(ty)
            }
            _ => Err(self.unexpected("a type")),
        }
    }

    fn starts_atom_type(&self) -> bool {
        matches!(
            self.peek(),
            Token::UpperIdent(_) | Token::Ident(_) | Token::LParen
        )
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    /// A pattern in a position that allows applied constructors without
    /// parentheses, e.g. a case alternative
    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        if let Token::UpperIdent(name) = self.peek().clone() {
            if name != "True" && name != "False" {
                self.advance();
                let mut args = Vec::new();
                while self.starts_atom_pattern() {
                    args.push(self.parse_atom_pattern()?);
                }
                return Ok(Pattern::Constructor(name, args));
            }
        }
        self.parse_atom_pattern()
    }

    fn parse_atom_pattern(&mut self) -> Result<Pattern, ParseError> {
        match self.peek().clone() {
            Token::Underscore => {
                self.advance();
                Ok(Pattern::Wildcard)
            }
            Token::Ident(n) => {
                self.advance();
                Ok(Pattern::Name(n))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Pattern::Lit(Literal::Int(n)))
            }
            Token::Minus => {
                // Negative integer literal pattern
                self.advance();
                match self.peek().clone() {
                    Token::Int(n) => {
                        self.advance();
                        Ok(Pattern::Lit(Literal::Int(-n)))
                    }
                    _ => Err(self.unexpected("an integer after `-`")),
                }
            }
            Token::String(s) => {
                self.advance();
                Ok(Pattern::Lit(Literal::Str(s)))
            }
            Token::True => {
                self.advance();
                Ok(Pattern::Lit(Literal::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Pattern::Lit(Literal::Bool(false)))
            }
            Token::UpperIdent(n) => {
                self.advance();
                Ok(Pattern::Constructor(n, Vec::new()))
            }
            Token::LParen => {
                self.advance();
                let pat = self.parse_pattern()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(pat)
            }
            _ => Err(self.unexpected("a pattern")),
        }
    }

    fn starts_atom_pattern(&self) -> bool {
        matches!(
            self.peek(),
            Token::Underscore
                | Token::Ident(_)
                | Token::Int(_)
                | Token::String(_)
                | Token::True
                | Token::False
                | Token::UpperIdent(_)
                | Token::LParen
        )
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::Backslash => self.parse_lambda(),
            Token::Let => self.parse_let(),
            Token::Case => self.parse_case(),
            Token::If => self.parse_if(),
            _ => self.parse_binary(0),
        }
    }

    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::Backslash, "`\\`")?;
        let mut params = vec![self.expect_ident("a parameter")?];
        while let Token::Ident(_) = self.peek() {
            params.push(self.expect_ident("a parameter")?);
        }
        self.expect(Token::Arrow, "`->`")?;
        let body = self.parse_expr()?;
        Ok(Expr::Lambda(params, Box::new(body)))
    }

    fn parse_let(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::Let, "`let`")?;
        let defs = if self.check(&Token::LBrace) {
            self.advance();
            let defs = self.parse_definitions_until(&Token::RBrace)?;
            self.expect(Token::RBrace, "`}`")?;
            defs
        } else {
            vec![self.parse_definition()?]
        };
        self.expect(Token::In, "`in`")?;
        let body = self.parse_expr()?;
        Ok(Expr::Let(defs, Box::new(body)))
    }

    fn parse_definitions_until(&mut self, end: &Token) -> Result<Vec<Definition>, ParseError> {
        let mut defs = Vec::new();
        self.skip_semicolons();
        while !self.check(end) {
            defs.push(self.parse_definition()?);
            if self.check(&Token::Semicolon) {
                self.skip_semicolons();
            } else {
                break;
            }
        }
        Ok(defs)
    }

    fn parse_case(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::Case, "`case`")?;
        let scrutinee = self.parse_expr()?;
        self.expect(Token::Of, "`of`")?;
        self.expect(Token::LBrace, "`{`")?;

        let mut alts = Vec::new();
        self.skip_semicolons();
        while !self.check(&Token::RBrace) {
            let pat = self.parse_pattern()?;
            self.expect(Token::Arrow, "`->`")?;
            let body = self.parse_expr()?;
            alts.push((pat, body));
            if self.check(&Token::Semicolon) {
                self.skip_semicolons();
            } else {
                break;
            }
        }
        self.expect(Token::RBrace, "`}`")?;
        Ok(Expr::Case(Box::new(scrutinee), alts))
    }

    /// `if c then t else e` is sugar for a boolean case
    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::If, "`if`")?;
        let cond = self.parse_expr()?;
        self.expect(Token::Then, "`then`")?;
        let then_branch = self.parse_expr()?;
        self.expect(Token::Else, "`else`")?;
        let else_branch = self.parse_expr()?;
        Ok(Expr::Case(
            Box::new(cond),
            vec![
                (Pattern::Lit(Literal::Bool(true)), then_branch),
                (Pattern::Lit(Literal::Bool(false)), else_branch),
            ],
        ))
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some((op, prec, right_assoc)) = binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if right_assoc { prec } else { prec + 1 };
            // Lambdas, lets and cases may appear as an operator's right
            // operand and extend as far right as possible
            let rhs = match self.peek() {
                Token::Backslash | Token::Let | Token::Case | Token::If => self.parse_expr()?,
                _ => self.parse_binary(next_min)?,
            };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.check(&Token::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.parse_application()
    }

    fn parse_application(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        while self.starts_atom() {
            let arg = self.parse_atom()?;
            expr = Expr::App(Box::new(expr), Box::new(arg));
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Lit(Literal::Int(n)))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Lit(Literal::Str(s)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Lit(Literal::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Lit(Literal::Bool(false)))
            }
            Token::Ident(n) => {
                self.advance();
                Ok(Expr::Name(n))
            }
            Token::UpperIdent(n) => {
                self.advance();
                Ok(Expr::Name(n))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(expr)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn starts_atom(&self) -> bool {
        matches!(
            self.peek(),
            Token::Int(_)
                | Token::String(_)
                | Token::True
                | Token::False
                | Token::Ident(_)
                | Token::UpperIdent(_)
                | Token::LParen
        )
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)].span
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ParseError> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_upper(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::UpperIdent(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn skip_semicolons(&mut self) {
        while self.check(&Token::Semicolon) {
            self.advance();
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        if self.check(&Token::Eof) {
            ParseError::UnexpectedEof(expected.to_string())
        } else {
            ParseError::UnexpectedToken {
                found: self.peek().clone(),
                expected: expected.to_string(),
                span: self.current_span(),
            }
        }
    }
}

fn is_base_type(name: &str) -> bool {
    matches!(name, "Int" | "String" | "Bool")
}

/// (builtin, precedence, right-associative)
fn binary_op(token: &Token) -> Option<(Builtin, u8, bool)> {
    match token {
        Token::EqEq => Some((Builtin::EqualTo, 4, false)),
        Token::Neq => Some((Builtin::NotEqualTo, 4, false)),
        Token::Lt => Some((Builtin::Less, 4, false)),
        Token::Lte => Some((Builtin::LessEqual, 4, false)),
        Token::Gt => Some((Builtin::Greater, 4, false)),
        Token::Gte => Some((Builtin::GreaterEqual, 4, false)),
        Token::Concat => Some((Builtin::Concat, 5, true)),
        Token::Plus => Some((Builtin::Add, 6, false)),
        Token::Minus => Some((Builtin::Sub, 6, false)),
        Token::Star => Some((Builtin::Mul, 7, false)),
        Token::Slash => Some((Builtin::Div, 7, false)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> Program {
        let tokens = Lexer::new(input).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    fn parse_expr(input: &str) -> Expr {
        let tokens = Lexer::new(input).tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        parser.parse_expr().unwrap()
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse_expr("1 + 2 * 3");
        match expr {
            Expr::Binary(Builtin::Add, lhs, rhs) => {
                assert_eq!(*lhs, Expr::Lit(Literal::Int(1)));
                assert!(matches!(*rhs, Expr::Binary(Builtin::Mul, _, _)));
            }
            other => panic!("expected Add at the top, got {:?}", other),
        }
    }

    #[test]
    fn test_concat_right_assoc() {
        let expr = parse_expr(r#""a" ++ "b" ++ "c""#);
        match expr {
            Expr::Binary(Builtin::Concat, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(Builtin::Concat, _, _)));
            }
            other => panic!("expected Concat, got {:?}", other),
        }
    }

    #[test]
    fn test_application_binds_tighter_than_ops() {
        // f x + 1 parses as (f x) + 1
        let expr = parse_expr("f x + 1");
        match expr {
            Expr::Binary(Builtin::Add, lhs, _) => {
                assert!(matches!(*lhs, Expr::App(_, _)));
            }
            other => panic!("expected Add, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_equation_program() {
        let program = parse("sum N = 0; sum (C x xs) = x + sum xs");
        assert_eq!(program.decls.len(), 2);
    }

    #[test]
    fn test_data_declaration() {
        let program = parse("data L = N | C Int L");
        match &program.decls[0] {
            Decl::Data { name, constructors, .. } => {
                assert_eq!(name, "L");
                assert_eq!(constructors.len(), 2);
                assert_eq!(constructors[1].fields.len(), 2);
            }
            other => panic!("expected data declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_case_with_nested_pattern() {
        let expr = parse_expr("case xs of { C x (C y ys) -> x; _ -> 0 }");
        match expr {
            Expr::Case(_, alts) => {
                assert_eq!(alts.len(), 2);
                match &alts[0].0 {
                    Pattern::Constructor(name, args) => {
                        assert_eq!(name, "C");
                        assert!(matches!(args[1], Pattern::Constructor(_, _)));
                    }
                    other => panic!("expected constructor pattern, got {:?}", other),
                }
            }
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn test_if_desugars_to_case() {
        let expr = parse_expr("if x then 1 else 2");
        assert!(matches!(expr, Expr::Case(_, _)));
    }

    #[test]
    fn test_annotation() {
        let program = parse("f :: Int -> Int; f x = x");
        assert!(matches!(
            &program.decls[0],
            Decl::Value(Definition::Annotation(_, TypeExpr::Function(_, _), _))
        ));
    }

    #[test]
    fn test_lambda_body_extends_right() {
        let expr = parse_expr("\\x -> x + 1");
        match expr {
            Expr::Lambda(params, body) => {
                assert_eq!(params, vec!["x".to_string()]);
                assert!(matches!(*body, Expr::Binary(Builtin::Add, _, _)));
            }
            other => panic!("expected lambda, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_minus() {
        let expr = parse_expr("take (n - 1) xs");
        assert!(matches!(expr, Expr::App(_, _)));
        let neg = parse_expr("-n");
        assert!(matches!(neg, Expr::Negate(_)));
    }

    #[test]
    fn test_missing_semicolon_fails() {
        let tokens = Lexer::new("f = 1 g = 2").tokenize().unwrap();
        assert!(Parser::new(tokens).parse_program().is_err());
    }
}
