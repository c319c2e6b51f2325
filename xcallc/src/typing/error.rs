///
/// Typing Errors
///
/// Errors raised while type-checking a user function against the host
/// typing registry.
///
/// Error categories:
/// - UnresolvedName: no typing rule exists for a called name
/// - ArityMismatch: rules exist but none takes that many arguments
/// - TypeMismatch: arity matches but argument types do not, or several
///   overloads match equally well (ambiguous)
/// - UnknownArgument: a body references a parameter that does not exist
/// - MissingReturn / UnreachableCode: malformed function bodies
///

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("unresolved external function '{name}'")]
    UnresolvedName { name: String },

    #[error("'{name}' expects {expected} argument(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("'{function}' has no argument {index} (it takes {arity})")]
    UnknownArgument {
        function: String,
        index: usize,
        arity: usize,
    },

    #[error("'{function}' does not return a value on every path")]
    MissingReturn { function: String },

    #[error("unreachable statement {statement} in '{function}'")]
    UnreachableCode { function: String, statement: usize },
}

impl TypeError {
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        TypeError::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Several overloads accept the same call site.
    pub fn ambiguous(name: &str, candidates: &[String]) -> Self {
        TypeError::TypeMismatch {
            context: format!("call to '{}'", name),
            expected: "a single matching overload".to_string(),
            found: format!("ambiguous between {}", candidates.join(" and ")),
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, TypeError::TypeMismatch { found, .. } if found.starts_with("ambiguous"))
    }
}
