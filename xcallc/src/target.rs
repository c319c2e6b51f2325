///
/// Targets and Per-Target Code Generation Settings
///
/// A Target names the device a build compiles for ("cpu", "gpu", ...).
/// External modules are attached per target, and the bridge config maps
/// each target to an ISA choice. TargetCodegen is the resolved form:
/// the ISA (when the target produces machine code), the pointer type
/// and the calling convention used for the entry function and its
/// foreign calls.
///

use std::fmt;

use cranelift::prelude::*;
use cranelift_codegen::isa::{self, CallConv, OwnedTargetIsa, TargetIsa};
use target_lexicon::Triple;
use serde::{Deserialize, Serialize};

use crate::config::{BridgeConfig, ConfigError, OptLevel};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Target(name.into())
    }

    pub fn cpu() -> Self {
        Target::new("cpu")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::new(value)
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        Target(value)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct TargetCodegen {
    isa: Option<OwnedTargetIsa>,
    pointer_type: Type,
    call_conv: CallConv,
}

impl fmt::Debug for TargetCodegen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetCodegen")
            .field("isa", &self.isa.as_ref().map(|isa| isa.triple().to_string()))
            .field("pointer_type", &self.pointer_type)
            .field("call_conv", &self.call_conv)
            .finish()
    }
}

impl TargetCodegen {
    pub fn resolve(target: &Target, config: &BridgeConfig) -> Result<Self, ConfigError> {
        let entry = config.target(target.as_str());

        if let Some(choice) = entry.and_then(|t| t.isa.as_deref()) {
            let isa = create_isa(choice, config.opt_level, true).map_err(|reason| ConfigError::Isa {
                target: target.to_string(),
                reason,
            })?;
            let codegen = Self {
                pointer_type: isa.pointer_type(),
                call_conv: isa.default_call_conv(),
                isa: Some(isa),
            };
            tracing::debug!(device = %target, isa = choice, "resolved native target");
            return Ok(codegen);
        }

        let width = entry
            .and_then(|t| t.pointer_width)
            .unwrap_or(config.pointer_width);
        let pointer_type = Type::int(u16::from(width)).ok_or_else(|| ConfigError::InvalidPointerWidth {
            target: target.to_string(),
            width,
        })?;
        tracing::debug!(device = %target, width, "resolved IR-only target");
        Ok(Self {
            isa: None,
            pointer_type,
            call_conv: CallConv::SystemV,
        })
    }

    pub fn isa(&self) -> Option<&dyn TargetIsa> {
        self.isa.as_deref()
    }

    pub fn owned_isa(&self) -> Option<OwnedTargetIsa> {
        self.isa.clone()
    }

    pub fn pointer_type(&self) -> Type {
        self.pointer_type
    }

    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }
}

/// Builds an ISA for `"host"` or a target triple.
pub fn create_isa(choice: &str, opt_level: OptLevel, pic: bool) -> Result<OwnedTargetIsa, String> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("use_colocated_libcalls", "false")
        .map_err(|e| e.to_string())?;
    flag_builder
        .set("is_pic", if pic { "true" } else { "false" })
        .map_err(|e| e.to_string())?;
    flag_builder
        .set("opt_level", opt_level.as_setting())
        .map_err(|e| e.to_string())?;

    let isa_builder = if choice == "host" {
        cranelift_native::builder().map_err(|e| format!("failed to create host ISA builder: {}", e))?
    } else {
        let triple = choice
            .parse::<Triple>()
            .map_err(|e| format!("invalid target triple '{}': {}", choice, e))?;
        isa::lookup(triple).map_err(|e| format!("failed to look up '{}': {}", choice, e))?
    };

    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| format!("failed to create ISA: {}", e))
}
