//!
//! LLVM-IR Text Adapter
//!
//! Extracts the global function symbols of an LLVM-IR text module so it
//! can be attached as an ExternalModule. Only top-level `define` and
//! `declare` lines are inspected; `internal` and `private` definitions
//! are not visible to the linker and are skipped. The text itself is
//! kept as an opaque payload.
//!

use memchr::memchr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrSymbols {
    pub defined: Vec<String>,
    pub declared: Vec<String>,
}

pub fn scan_llvm_ir(text: &str) -> IrSymbols {
    let mut symbols = IrSymbols::default();

    for line in text.lines() {
        let line = line.trim_start();
        let (is_define, rest) = if let Some(rest) = line.strip_prefix("define") {
            (true, rest)
        } else if let Some(rest) = line.strip_prefix("declare") {
            (false, rest)
        } else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }

        let Some(at) = memchr(b'@', rest.as_bytes()) else {
            continue;
        };
        let head = &rest[..at];
        let Some(name) = symbol_name(&rest[at + 1..]) else {
            continue;
        };

        if is_define {
            let local = head
                .split_whitespace()
                .any(|word| word == "internal" || word == "private");
            if !local && !symbols.defined.contains(&name) {
                symbols.defined.push(name);
            }
        } else if !symbols.declared.contains(&name) {
            symbols.declared.push(name);
        }
    }

    symbols
        .declared
        .retain(|name| !symbols.defined.contains(name));
    symbols
}

fn symbol_name(text: &str) -> Option<String> {
    if let Some(quoted) = text.strip_prefix('"') {
        let end = memchr(b'"', quoted.as_bytes())?;
        return Some(quoted[..end].to_string());
    }
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-')))
        .unwrap_or(text.len());
    (end > 0).then(|| text[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"
; ModuleID = 'model.c'
target triple = "x86_64-unknown-linux-gnu"

define dso_local float @predict_float(float* nocapture readonly %0, i32 %1) local_unnamed_addr #0 {
  %3 = tail call float @llvm.fabs.f32(float 0.0)
  %4 = call double @exp(double 1.0)
  ret float %3
}

define internal fastcc i32 @helper(i32 %x) {
  ret i32 %x
}

define private void @"quoted.private"() {
  ret void
}

define void @"needs quotes"() {
  ret void
}

declare float @llvm.fabs.f32(float)
declare double @exp(double) #1
declare float @predict_float(float*, i32)
"#;

    #[test]
    fn test_scan_defines_and_declares() {
        let symbols = scan_llvm_ir(MODEL);
        assert_eq!(symbols.defined, vec!["predict_float", "needs quotes"]);
        assert_eq!(symbols.declared, vec!["llvm.fabs.f32", "exp"]);
    }

    #[test]
    fn test_ignores_non_declaration_lines() {
        let symbols = scan_llvm_ir("definitely not ir\n  %x = call i32 @foo()\n@g = global i32 0\n");
        assert_eq!(symbols, IrSymbols::default());
    }
}
