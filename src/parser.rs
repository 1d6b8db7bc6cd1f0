//! Recursive-descent parser.
//!
//! Consumes the lexer one token at a time through its `current`/`next`/
//! `expect` interface and produces the [`Statement`] tree. Classes are
//! resolved at parse time: a `class` definition registers the finished
//! [`Class`] in a table, and a name in call position must name a registered
//! class (it becomes a `NewInstance` node) or `str` (a `Stringify` node).

use std::collections::HashMap;

use thiserror::Error;

use crate::ast::{ArithmeticOp, ComparisonOp, Statement, VariableValue};
use crate::lexer::{LexError, Lexer};
use crate::runtime::{Class, Method};
use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("Expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: Token },
    #[error("Unknown class '{name}'")]
    UnknownClass { name: String },
    #[error("Cannot assign to this expression")]
    InvalidAssignmentTarget,
    #[error("str() takes exactly one argument, got {found}")]
    StringifyArity { found: usize },
}

/// Parses a whole program into a top-level `Compound` statement.
pub fn parse(input: &str) -> Result<Statement, ParseError> {
    Parser::new(input)?.parse_program()
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    classes: HashMap<String, Class>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Result<Self, ParseError> {
        Ok(Self {
            lexer: Lexer::new(input)?,
            classes: HashMap::new(),
        })
    }

    pub fn parse_program(mut self) -> Result<Statement, ParseError> {
        let mut statements = Vec::new();
        while !matches!(self.lexer.current_token(), Token::Eof) {
            statements.push(self.parse_statement()?);
        }
        Ok(Statement::Compound(statements))
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.lexer.current_token() {
            Token::Class => self.parse_class_definition(),
            Token::If => self.parse_if_else(),
            Token::Print => self.parse_print(),
            Token::Return => self.parse_return(),
            _ => self.parse_assignment_or_expression(),
        }
    }

    fn parse_class_definition(&mut self) -> Result<Statement, ParseError> {
        let name = self.lexer.expect_next_id()?.to_string();
        self.lexer.next_token()?;
        let parent = if matches!(self.lexer.current_token(), Token::Char('(')) {
            let parent_name = self.lexer.expect_next_id()?.to_string();
            self.lexer.expect_next(&Token::Char(')'))?;
            self.lexer.next_token()?;
            Some(self.lookup_class(&parent_name)?)
        } else {
            None
        };

        self.lexer.expect(&Token::Char(':'))?;
        self.lexer.expect_next(&Token::Newline)?;
        self.lexer.expect_next(&Token::Indent)?;
        self.lexer.next_token()?;
        let mut methods = Vec::new();
        while matches!(self.lexer.current_token(), Token::Def) {
            methods.push(self.parse_method()?);
        }
        self.expect_and_advance(&Token::Dedent)?;

        let class = Class::new(name.clone(), methods, parent);
        self.classes.insert(name, class.clone());
        Ok(Statement::ClassDefinition { class })
    }

    fn parse_method(&mut self) -> Result<Method, ParseError> {
        let name = self.lexer.expect_next_id()?.to_string();
        self.lexer.expect_next(&Token::Char('('))?;
        self.lexer.next_token()?;
        let mut formal_params = Vec::new();
        if !matches!(self.lexer.current_token(), Token::Char(')')) {
            loop {
                formal_params.push(self.lexer.expect_id()?.to_string());
                self.lexer.next_token()?;
                if matches!(self.lexer.current_token(), Token::Char(',')) {
                    self.lexer.next_token()?;
                } else {
                    break;
                }
            }
        }
        self.expect_and_advance(&Token::Char(')'))?;
        let body = self.parse_suite()?;
        Ok(Method {
            name,
            formal_params,
            body: Box::new(Statement::MethodBody {
                body: Box::new(body),
            }),
        })
    }

    /// `':' NEWLINE INDENT statement+ DEDENT`
    fn parse_suite(&mut self) -> Result<Statement, ParseError> {
        self.lexer.expect(&Token::Char(':'))?;
        self.lexer.expect_next(&Token::Newline)?;
        self.lexer.expect_next(&Token::Indent)?;
        self.lexer.next_token()?;
        let mut statements = Vec::new();
        while !matches!(self.lexer.current_token(), Token::Dedent | Token::Eof) {
            statements.push(self.parse_statement()?);
        }
        self.expect_and_advance(&Token::Dedent)?;
        Ok(Statement::Compound(statements))
    }

    fn parse_if_else(&mut self) -> Result<Statement, ParseError> {
        self.lexer.next_token()?;
        let condition = self.parse_expression()?;
        let if_body = self.parse_suite()?;
        let else_body = if matches!(self.lexer.current_token(), Token::Else) {
            self.lexer.next_token()?;
            Some(Box::new(self.parse_suite()?))
        } else {
            None
        };
        Ok(Statement::IfElse {
            condition: Box::new(condition),
            if_body: Box::new(if_body),
            else_body,
        })
    }

    fn parse_print(&mut self) -> Result<Statement, ParseError> {
        self.lexer.next_token()?;
        let mut args = Vec::new();
        if !matches!(
            self.lexer.current_token(),
            Token::Newline | Token::Dedent | Token::Eof
        ) {
            loop {
                args.push(self.parse_expression()?);
                if matches!(self.lexer.current_token(), Token::Char(',')) {
                    self.lexer.next_token()?;
                } else {
                    break;
                }
            }
        }
        self.end_of_statement()?;
        Ok(Statement::Print { args })
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        self.lexer.next_token()?;
        let value = self.parse_expression()?;
        self.end_of_statement()?;
        Ok(Statement::Return {
            value: Box::new(value),
        })
    }

    fn parse_assignment_or_expression(&mut self) -> Result<Statement, ParseError> {
        let expression = self.parse_expression()?;
        if matches!(self.lexer.current_token(), Token::Char('=')) {
            self.lexer.next_token()?;
            let value = self.parse_expression()?;
            self.end_of_statement()?;
            let Statement::Variable(target) = expression else {
                return Err(ParseError::InvalidAssignmentTarget);
            };
            return Ok(target.into_assignment(value));
        }
        self.end_of_statement()?;
        Ok(expression)
    }

    /// A statement ends at a newline, or at the `Dedent`/`Eof` that closes
    /// its block (left for the enclosing suite to consume).
    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        match self.lexer.current_token() {
            Token::Newline => {
                self.lexer.next_token()?;
                Ok(())
            }
            Token::Dedent | Token::Eof => Ok(()),
            found => Err(ParseError::UnexpectedToken {
                expected: "end of line".to_string(),
                found: found.clone(),
            }),
        }
    }

    fn parse_expression(&mut self) -> Result<Statement, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Statement, ParseError> {
        let mut expression = self.parse_and()?;
        while matches!(self.lexer.current_token(), Token::Or) {
            self.lexer.next_token()?;
            let rhs = self.parse_and()?;
            expression = Statement::Or {
                lhs: Box::new(expression),
                rhs: Box::new(rhs),
            };
        }
        Ok(expression)
    }

    fn parse_and(&mut self) -> Result<Statement, ParseError> {
        let mut expression = self.parse_not()?;
        while matches!(self.lexer.current_token(), Token::And) {
            self.lexer.next_token()?;
            let rhs = self.parse_not()?;
            expression = Statement::And {
                lhs: Box::new(expression),
                rhs: Box::new(rhs),
            };
        }
        Ok(expression)
    }

    fn parse_not(&mut self) -> Result<Statement, ParseError> {
        if matches!(self.lexer.current_token(), Token::Not) {
            self.lexer.next_token()?;
            return Ok(Statement::Not {
                argument: Box::new(self.parse_not()?),
            });
        }
        self.parse_comparison()
    }

    /// A single, non-chained comparison.
    fn parse_comparison(&mut self) -> Result<Statement, ParseError> {
        let lhs = self.parse_additive()?;
        let op = match self.lexer.current_token() {
            Token::Eq => ComparisonOp::Equal,
            Token::NotEq => ComparisonOp::NotEqual,
            Token::Char('<') => ComparisonOp::Less,
            Token::Char('>') => ComparisonOp::Greater,
            Token::LessOrEq => ComparisonOp::LessOrEqual,
            Token::GreaterOrEq => ComparisonOp::GreaterOrEqual,
            _ => return Ok(lhs),
        };
        self.lexer.next_token()?;
        let rhs = self.parse_additive()?;
        Ok(Statement::Comparison {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> Result<Statement, ParseError> {
        let mut expression = self.parse_term()?;
        loop {
            let op = match self.lexer.current_token() {
                Token::Char('+') => ArithmeticOp::Add,
                Token::Char('-') => ArithmeticOp::Sub,
                _ => return Ok(expression),
            };
            self.lexer.next_token()?;
            let rhs = self.parse_term()?;
            expression = Statement::Arithmetic {
                op,
                lhs: Box::new(expression),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Statement, ParseError> {
        let mut expression = self.parse_primary()?;
        loop {
            let op = match self.lexer.current_token() {
                Token::Char('*') => ArithmeticOp::Mult,
                Token::Char('/') => ArithmeticOp::Div,
                _ => return Ok(expression),
            };
            self.lexer.next_token()?;
            let rhs = self.parse_primary()?;
            expression = Statement::Arithmetic {
                op,
                lhs: Box::new(expression),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_primary(&mut self) -> Result<Statement, ParseError> {
        match self.lexer.current_token().clone() {
            Token::Number(value) => {
                self.lexer.next_token()?;
                Ok(Statement::Number(value))
            }
            Token::String(value) => {
                self.lexer.next_token()?;
                Ok(Statement::String(value))
            }
            Token::True => {
                self.lexer.next_token()?;
                Ok(Statement::Bool(true))
            }
            Token::False => {
                self.lexer.next_token()?;
                Ok(Statement::Bool(false))
            }
            Token::None => {
                self.lexer.next_token()?;
                Ok(Statement::None)
            }
            Token::Char('(') => {
                self.lexer.next_token()?;
                let expression = self.parse_expression()?;
                self.expect_and_advance(&Token::Char(')'))?;
                Ok(expression)
            }
            Token::Id(name) => {
                self.lexer.next_token()?;
                self.parse_name_chain(name)
            }
            found => Err(ParseError::UnexpectedToken {
                expected: "an expression".to_string(),
                found,
            }),
        }
    }

    /// `Id ('.' Id)*` followed by an optional call, then any number of
    /// chained `.method(args)` calls on the result.
    fn parse_name_chain(&mut self, name: String) -> Result<Statement, ParseError> {
        let mut fields = Vec::new();
        while matches!(self.lexer.current_token(), Token::Char('.')) {
            fields.push(self.lexer.expect_next_id()?.to_string());
            self.lexer.next_token()?;
        }

        if !matches!(self.lexer.current_token(), Token::Char('(')) {
            return Ok(Statement::Variable(VariableValue::dotted(name, fields)));
        }

        let mut args = self.parse_call_args()?;
        let mut node = match fields.pop() {
            Some(method) => Statement::MethodCall {
                object: Box::new(Statement::Variable(VariableValue::dotted(name, fields))),
                method,
                args,
            },
            None if name == "str" => {
                if args.len() != 1 {
                    return Err(ParseError::StringifyArity { found: args.len() });
                }
                Statement::Stringify {
                    argument: Box::new(args.remove(0)),
                }
            }
            None => Statement::NewInstance {
                class: self.lookup_class(&name)?,
                args,
            },
        };

        while matches!(self.lexer.current_token(), Token::Char('.')) {
            let method = self.lexer.expect_next_id()?.to_string();
            self.lexer.expect_next(&Token::Char('('))?;
            let args = self.parse_call_args()?;
            node = Statement::MethodCall {
                object: Box::new(node),
                method,
                args,
            };
        }
        Ok(node)
    }

    /// Argument list with the opening parenthesis as the current token.
    fn parse_call_args(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.lexer.next_token()?;
        let mut args = Vec::new();
        if !matches!(self.lexer.current_token(), Token::Char(')')) {
            loop {
                args.push(self.parse_expression()?);
                if matches!(self.lexer.current_token(), Token::Char(',')) {
                    self.lexer.next_token()?;
                } else {
                    break;
                }
            }
        }
        self.expect_and_advance(&Token::Char(')'))?;
        Ok(args)
    }

    fn lookup_class(&self, name: &str) -> Result<Class, ParseError> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| ParseError::UnknownClass {
                name: name.to_string(),
            })
    }

    fn expect_and_advance(&mut self, expected: &Token) -> Result<(), ParseError> {
        self.lexer.expect(expected)?;
        self.lexer.next_token()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse_err(input: &str) -> ParseError {
        parse(input).expect_err("expected a parse error")
    }

    #[test]
    fn parses_an_empty_program() {
        let program = parse("").expect("parse");
        assert!(matches!(program, Statement::Compound(ref s) if s.is_empty()));
    }

    #[test]
    fn rejects_calls_to_unknown_classes() {
        assert_eq!(
            parse_err("x = Missing()\n"),
            ParseError::UnknownClass {
                name: "Missing".to_string(),
            }
        );
    }

    #[test]
    fn rejects_unknown_parent_classes() {
        let input = indoc! {"
            class B(A):
              def m():
                return 1
        "};
        assert_eq!(
            parse_err(input),
            ParseError::UnknownClass {
                name: "A".to_string(),
            }
        );
    }

    #[test]
    fn rejects_assignment_to_a_call_result() {
        let input = indoc! {"
            class A:
              def m():
                return 1
            a = A()
            a.m() = 2
        "};
        assert_eq!(parse_err(input), ParseError::InvalidAssignmentTarget);
    }

    #[test]
    fn rejects_str_with_the_wrong_number_of_arguments() {
        assert_eq!(
            parse_err("x = str(1, 2)\n"),
            ParseError::StringifyArity { found: 2 }
        );
    }

    #[test]
    fn reports_unexpected_tokens_at_statement_end() {
        let error = parse_err("x = 1 2\n");
        assert_eq!(
            error,
            ParseError::UnexpectedToken {
                expected: "end of line".to_string(),
                found: Token::Number(2),
            }
        );
    }

    #[test]
    fn propagates_lexical_errors() {
        let error = parse_err("x = !\n");
        assert!(matches!(error, ParseError::Lex(LexError::LoneExclamation { .. })));
    }

    #[test]
    fn class_bodies_must_be_method_definitions() {
        let input = indoc! {"
            class A:
              x = 1
        "};
        assert!(matches!(parse_err(input), ParseError::Lex(LexError::UnexpectedToken { .. })));
    }
}
