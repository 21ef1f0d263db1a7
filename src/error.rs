//=============================================
// src/error.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript error taxonomy
// Objective: One error type covering lexing, parsing, and runtime failures
//=============================================

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the language core can surface to a host.
///
/// Lex and parse errors abort compilation of the offending unit; runtime
/// errors abort the executing context only. Variants carry the originating
/// source line where one exists.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("Lexer error at line {line}: {message}")]
    Lex { line: usize, message: String },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Type conversion error at line {line}: {message}")]
    TypeConversion { line: usize, message: String },

    #[error("Index {index} out of bounds for array of length {length} at line {line}")]
    ArrayIndex {
        line: usize,
        index: i64,
        length: usize,
    },

    #[error("Modulo by zero at line {line}")]
    ModuloByZero { line: usize },

    #[error("Record validation error at line {line}: {message}")]
    RecordValidation { line: usize, message: String },

    #[error("Unknown function '{name}' called at line {line}")]
    UndefinedFunction { line: usize, name: String },

    #[error("Unknown builtin '{name}'")]
    UnknownBuiltin { name: String },

    #[error("Circular import detected: {}", format_chain(.chain))]
    CircularImport { chain: Vec<PathBuf> },

    #[error(
        "Duplicate declaration of '{name}': first declared in {}, redeclared in {}",
        .first.display(),
        .second.display()
    )]
    DuplicateDeclaration {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Runtime error at line {line}: {message}")]
    Runtime { line: usize, message: String },
}

impl ScriptError {
    pub fn runtime(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            line,
            message: message.into(),
        }
    }

    pub fn type_conversion(line: usize, message: impl Into<String>) -> Self {
        ScriptError::TypeConversion {
            line,
            message: message.into(),
        }
    }

    /// The source line an error originated from, where one is known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Lex { line, .. }
            | ScriptError::Parse { line, .. }
            | ScriptError::TypeConversion { line, .. }
            | ScriptError::ArrayIndex { line, .. }
            | ScriptError::ModuloByZero { line }
            | ScriptError::RecordValidation { line, .. }
            | ScriptError::UndefinedFunction { line, .. }
            | ScriptError::Runtime { line, .. } => Some(*line),
            _ => None,
        }
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type ScriptResult<T> = Result<T, ScriptError>;
