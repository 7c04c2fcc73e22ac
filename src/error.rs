//! Error types for the PyLog to HLS compiler

use std::path::PathBuf;

use thiserror::Error;

use crate::ast::Span;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation errors
///
/// Every pass reports failures through this enum and propagates them
/// unchanged to the caller. There is no recovery: a failed pass aborts the
/// whole compilation and nothing is written to the workspace.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Lexer error at {location}: {message}")]
    LexerError { location: Span, message: String },

    #[error("Parse error at {location}: {message}")]
    ParseError { location: Span, message: String },

    /// Malformed or missing numeric-format metadata on an input array
    #[error("Argument type error: {message}")]
    ArgumentTypeError { message: String },

    /// The source uses a construct outside the compiled subset
    #[error("Unsupported syntax at {location}: {construct}")]
    UnsupportedSyntaxError { construct: String, location: Span },

    /// An expression's hardware type cannot be resolved
    #[error("Type inference error{}: {message}", fmt_location(.location))]
    TypeInferenceError {
        message: String,
        location: Option<Span>,
    },

    /// The final IR contains a node the generator cannot render
    #[error("Code generation error: {message}")]
    CodeGenError { message: String },

    /// No kernel registered under the requested name
    #[error("Unknown kernel `{name}`")]
    UnknownKernel { name: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn fmt_location(location: &Option<Span>) -> String {
    match location {
        Some(span) => format!(" at {}", span),
        None => String::new(),
    }
}

impl CompileError {
    pub fn parse_error(location: Span, msg: impl Into<String>) -> Self {
        CompileError::ParseError {
            location,
            message: msg.into(),
        }
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        CompileError::ArgumentTypeError {
            message: msg.into(),
        }
    }

    pub fn unsupported(construct: impl Into<String>, location: Span) -> Self {
        CompileError::UnsupportedSyntaxError {
            construct: construct.into(),
            location,
        }
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        CompileError::TypeInferenceError {
            message: msg.into(),
            location: None,
        }
    }

    pub fn type_error_at(location: Span, msg: impl Into<String>) -> Self {
        CompileError::TypeInferenceError {
            message: msg.into(),
            location: Some(location),
        }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        CompileError::CodeGenError {
            message: msg.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }

    /// Source location attached to the error, if any
    pub fn location(&self) -> Option<Span> {
        match self {
            CompileError::LexerError { location, .. }
            | CompileError::ParseError { location, .. }
            | CompileError::UnsupportedSyntaxError { location, .. } => Some(*location),
            CompileError::TypeInferenceError { location, .. } => *location,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_located_messages() {
        let err = CompileError::unsupported("class definition", Span::new(3, 5));
        assert_eq!(err.to_string(), "Unsupported syntax at 3:5: class definition");
        assert_eq!(err.location(), Some(Span::new(3, 5)));

        let err = CompileError::type_error("unbound name `x`");
        assert_eq!(err.to_string(), "Type inference error: unbound name `x`");
        assert_eq!(err.location(), None);
    }
}
