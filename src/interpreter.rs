//! Top-level execution entry point wiring lexer, parser and evaluator.

use std::io;

use thiserror::Error;

use crate::lexer::LexError;
use crate::parser::{self, ParseError};
use crate::runtime::{Closure, Context, ExecError, Executable, RuntimeError};

/// Umbrella error for a full program run. Lexical and parse failures come
/// from the frontend, runtime failures from the evaluator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Parses and executes a Mython program, writing its output to `output`.
///
/// Output produced before a failing statement has already been written to
/// the sink when an error is returned.
pub fn run(source: &str, output: &mut dyn io::Write) -> Result<(), Error> {
    let program = parser::parse(source).map_err(|error| match error {
        // Lexical failures keep their own kind even when the parser hit them.
        ParseError::Lex(lex) => Error::Lex(lex),
        other => Error::Parse(other),
    })?;
    let mut globals = Closure::new();
    let mut context = Context::new(output);
    match program.execute(&mut globals, &mut context) {
        Ok(_) => Ok(()),
        Err(ExecError::Runtime(error)) => Err(error.into()),
        // A return signal that reaches the top level never had a method
        // body to catch it.
        Err(ExecError::Return) => Err(RuntimeError::ReturnOutsideMethod.into()),
    }
}
