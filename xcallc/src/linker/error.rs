///
/// Build Errors
///
/// Everything that can abort one build: type and lowering failures,
/// target resolution, link conflicts and unresolved symbols. A build
/// error never changes the catalog or other builds.
///

use thiserror::Error;

use crate::config::ConfigError;
use crate::lowering::LoweringError;
use crate::typing::TypeError;

use super::Stage;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Lowering(#[from] LoweringError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("symbol '{symbol}' from module '{module}' is already defined by {existing}")]
    LinkConflict {
        symbol: String,
        module: String,
        existing: String,
    },

    #[error("module '{module}' defines '{symbol}' as '{found}', but it is called as '{expected}'")]
    SignatureMismatch {
        symbol: String,
        module: String,
        expected: String,
        found: String,
    },

    #[error("unresolved symbol(s) for target '{target}': {}", .symbols.join(", "))]
    UnresolvedSymbol { target: String, symbols: Vec<String> },

    #[error("module '{module}' targets '{found}', but the build targets '{expected}'")]
    TargetMismatch {
        module: String,
        expected: String,
        found: String,
    },

    #[error("cannot {attempted} a build in stage {stage}")]
    InvalidTransition { stage: Stage, attempted: &'static str },

    #[error("invalid module '{module}': {reason}")]
    InvalidModule { module: String, reason: String },

    #[error("code generation failed: {0}")]
    Codegen(String),
}

impl BuildError {
    pub fn is_link_conflict(&self) -> bool {
        matches!(self, BuildError::LinkConflict { .. })
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, BuildError::UnresolvedSymbol { .. })
    }
}
