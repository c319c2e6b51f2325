///
/// Typing Bridge
///
/// Host-side typing registry. Every registered Signature installs one
/// typing rule keyed by its name; a rule accepts a call site when the
/// argument count equals the parameter count and every argument reaches
/// its parameter (see `types::coerce`).
///
/// Rules for the same name installed by different scopes are overloads.
/// Resolution works in tiers: candidates whose arguments all match
/// exactly (buffer decay included) are considered first, then those that
/// need implicit conversions. A tier with exactly one candidate resolves
/// the call; more than one is an ambiguity error.
///

mod error;

pub use error::TypeError;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use smallvec::SmallVec;

use crate::registry::ScopeId;
use crate::signature::Signature;
use crate::types::{coerce, Coercion, Parameter, ValueType};

pub type Coercions = SmallVec<[Coercion; 4]>;

#[derive(Debug, Clone)]
pub struct TypingRule {
    scopes: SmallVec<[ScopeId; 2]>,
    signature: Arc<Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    Arity,
    Mismatch {
        index: usize,
        expected: Parameter,
        found: ValueType,
    },
    Matched(Coercions),
}

impl TypingRule {
    pub fn signature(&self) -> &Arc<Signature> {
        &self.signature
    }

    pub fn check(&self, args: &[ValueType]) -> RuleMatch {
        if args.len() != self.signature.arity() {
            return RuleMatch::Arity;
        }
        let mut coercions = Coercions::new();
        for (index, (&arg, &param)) in args.iter().zip(&self.signature.params).enumerate() {
            match coerce(arg, param) {
                Some(c) => coercions.push(c),
                None => {
                    return RuleMatch::Mismatch {
                        index,
                        expected: param,
                        found: arg,
                    };
                }
            }
        }
        RuleMatch::Matched(coercions)
    }
}

/// A call site bound to one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub signature: Arc<Signature>,
    pub coercions: Coercions,
}

impl Resolution {
    pub fn return_type(&self) -> ValueType {
        ValueType::Scalar(self.signature.return_type)
    }
}

#[derive(Debug, Default)]
pub struct TypingRegistry {
    rules: RwLock<HashMap<String, Vec<TypingRule>>>,
}

impl TypingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn install(&self, scope: ScopeId, signature: &Arc<Signature>) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let overloads = rules.entry(signature.name.clone()).or_default();
        match overloads.iter_mut().find(|r| *r.signature == **signature) {
            Some(rule) => {
                if !rule.scopes.contains(&scope) {
                    rule.scopes.push(scope);
                }
            }
            None => overloads.push(TypingRule {
                scopes: SmallVec::from_elem(scope, 1),
                signature: Arc::clone(signature),
            }),
        }
    }

    pub(crate) fn remove_scope(&self, scope: ScopeId) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.retain(|_, overloads| {
            overloads.retain_mut(|rule| {
                rule.scopes.retain(|s| *s != scope);
                !rule.scopes.is_empty()
            });
            !overloads.is_empty()
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn candidates(&self, name: &str) -> Vec<Arc<Signature>> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|overloads| overloads.iter().map(|r| Arc::clone(&r.signature)).collect())
            .unwrap_or_default()
    }

    pub fn resolve(&self, name: &str, args: &[ValueType]) -> Result<Resolution, TypeError> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let overloads = rules
            .get(name)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| TypeError::UnresolvedName {
                name: name.to_string(),
            })?;

        let mut exact = Vec::new();
        let mut converted = Vec::new();
        let mut mismatch = None;

        for rule in overloads {
            match rule.check(args) {
                RuleMatch::Arity => {}
                RuleMatch::Mismatch {
                    index,
                    expected,
                    found,
                } => {
                    mismatch.get_or_insert_with(|| {
                        TypeError::type_mismatch(
                            format!("argument {} of '{}'", index + 1, name),
                            expected,
                            found,
                        )
                    });
                }
                RuleMatch::Matched(coercions) => {
                    let resolution = Resolution {
                        signature: Arc::clone(&rule.signature),
                        coercions,
                    };
                    if resolution.coercions.iter().all(|c| c.is_structural()) {
                        exact.push(resolution);
                    } else {
                        converted.push(resolution);
                    }
                }
            }
        }

        for mut tier in [exact, converted] {
            if tier.len() > 1 {
                let names: Vec<String> = tier.iter().map(|r| r.signature.to_string()).collect();
                tracing::trace!(function = name, candidates = ?names, "ambiguous external call");
                return Err(TypeError::ambiguous(name, &names));
            }
            if let Some(resolution) = tier.pop() {
                tracing::trace!(function = name, signature = %resolution.signature, "resolved external call");
                return Ok(resolution);
            }
        }

        Err(mismatch.unwrap_or_else(|| TypeError::ArityMismatch {
            name: name.to_string(),
            expected: overloads[0].signature.arity(),
            found: args.len(),
        }))
    }
}
