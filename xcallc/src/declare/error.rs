///
/// Declaration Parse Errors
///
/// Errors produced while parsing a textual signature such as
/// `float predict_float(float*, int32)`. Every error carries the Span of
/// the offending text so it can be rendered with miette.
///

use crate::source::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected {expected}, found '{found}'")]
    Expected {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unknown type '{name}'")]
    UnknownType { name: String, span: Span },

    #[error("unexpected character '{ch}'")]
    UnexpectedChar { ch: char, span: Span },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String, span: Span },

    #[error("unclosed parameter list")]
    UnclosedDelimiter { span: Span },

    #[error("unexpected trailing input")]
    TrailingInput { span: Span },

    #[error("void cannot be passed by value")]
    VoidParameter { span: Span },
}

impl ParseError {
    pub fn expected(expected: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        ParseError::Expected {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ParseError::Expected { span, .. } => *span,
            ParseError::UnknownType { span, .. } => *span,
            ParseError::UnexpectedChar { span, .. } => *span,
            ParseError::UnexpectedEof { span, .. } => *span,
            ParseError::UnclosedDelimiter { span } => *span,
            ParseError::TrailingInput { span } => *span,
            ParseError::VoidParameter { span } => *span,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
