///
/// Lowering Errors
///
/// Failures while turning type-checked call sites into Cranelift IR.
/// These indicate a build-local problem; the catalog is never touched.
///

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoweringError {
    #[error("no lowering rule for '{signature}'")]
    MissingRule { signature: String },

    #[error("symbol '{symbol}' is imported as '{existing}' and '{attempted}'")]
    SymbolClash {
        symbol: String,
        existing: String,
        attempted: String,
    },

    #[error("cannot marshal argument {index} of '{symbol}': {reason}")]
    Marshal {
        symbol: String,
        index: usize,
        reason: String,
    },

    #[error("call to '{symbol}' produced no result")]
    MissingResult { symbol: String },

    #[error("IR verification failed for '{function}': {message}")]
    Verifier { function: String, message: String },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl LoweringError {
    pub fn marshal(symbol: &str, index: usize, reason: impl Into<String>) -> Self {
        LoweringError::Marshal {
            symbol: symbol.to_string(),
            index,
            reason: reason.into(),
        }
    }
}
