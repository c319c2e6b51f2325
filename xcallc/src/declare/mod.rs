///
/// Declaration Module - Ad Hoc Signature Registration
///
/// Parses one textual C-like signature and registers it through a
/// Registry. The grammar is
///
///   RETTYPE NAME '(' [TYPE (',' TYPE)*] ')'
///   TYPE ::= PRIMITIVE | PRIMITIVE '*'
///
/// Structure:
/// - lexer: identifiers and punctuation with byte spans
/// - combinators: nom input type over tokens and token matchers
/// - error: ParseError with spans for diagnostics
///
/// Entry points: parse_signature() for parsing only, Registry::declare()
/// for parse-and-register which returns an ExternalFn handle.
///

mod combinators;
mod error;
mod lexer;

pub use error::{ParseError, ParseResult};
pub use lexer::{tokenize, Token, TokenKind};

use std::sync::Arc;

use nom::combinator::opt;
use nom::multi::separated_list1;
use thiserror::Error;

use crate::catalog::RegistryError;
use crate::registry::Registry;
use crate::signature::Signature;
use crate::source::Span;
use crate::types::{Parameter, Primitive};
use crate::udf::Expr;

use combinators::{fail, ident, token, PErrorKind, PResult, TokenStream};

#[derive(Debug, Error)]
pub enum DeclareError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Callable handle for a declared external function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFn {
    signature: Arc<Signature>,
}

impl ExternalFn {
    pub(crate) fn new(signature: Arc<Signature>) -> Self {
        Self { signature }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Builds a call expression for use in a user function body.
    pub fn call(&self, args: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::call(self.signature.name.clone(), args)
    }
}

impl Registry {
    /// Parses `text` and registers the resulting signature in this scope.
    pub fn declare(&self, text: &str) -> Result<ExternalFn, DeclareError> {
        let signature = parse_signature(text)?;
        let stored = self.register_signature(signature)?;
        tracing::debug!(scope = %self.label(), signature = %stored, "declared external function");
        Ok(ExternalFn::new(stored))
    }
}

pub fn parse_signature(source: &str) -> ParseResult<Signature> {
    let tokens = tokenize(source)?;
    let input = TokenStream::new(&tokens, source);

    match signature(input) {
        Ok((_, sig)) => Ok(sig),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e.into_parse_error()),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::UnexpectedEof {
            expected: "signature".to_string(),
            span: Span::empty_at(source.len() as u32),
        }),
    }
}

fn signature(input: TokenStream) -> PResult<Signature> {
    let (input, (return_type, _)) = primitive(input)?;
    let (input, (name, _)) = ident(input)?;
    let (input, _) = token(TokenKind::LParen)(input)?;
    let (input, params) = opt(separated_list1(token(TokenKind::Comma), parameter))(input)?;
    let (input, _) = token(TokenKind::RParen)(input)?;
    let (input, _) = token(TokenKind::Eof)(input)?;

    Ok((input, Signature::new(name, return_type, params.unwrap_or_default())))
}

fn primitive(input: TokenStream) -> PResult<(Primitive, Span)> {
    let (rest, (name, span)) = match ident(input) {
        Ok(ok) => ok,
        Err(nom::Err::Error(_)) => {
            return Err(nom::Err::Error(combinators::PError {
                input,
                kind: PErrorKind::ExpectedType,
            }));
        }
        Err(e) => return Err(e),
    };
    match Primitive::from_name(name) {
        Some(ty) => Ok((rest, (ty, span))),
        None => fail(input, PErrorKind::UnknownType),
    }
}

fn parameter(input: TokenStream) -> PResult<Parameter> {
    let (rest, (ty, _)) = primitive(input)?;
    let (rest, star) = opt(token(TokenKind::Star))(rest)?;
    let param = Parameter::from_flag(ty, star.is_some());
    if param == Parameter::Value(Primitive::Void) {
        return fail(input, PErrorKind::VoidParameter);
    }
    Ok((rest, param))
}
