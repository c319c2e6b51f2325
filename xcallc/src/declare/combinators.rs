//!
//! Base Combinators for Token Parsing
//!
//! A nom input type over the declaration tokens plus the token-matching
//! combinators the declaration grammar is built from.
//!

use nom::error::{ErrorKind, ParseError as NomParseError};
use nom::{IResult, InputLength};

use crate::source::Span;

use super::error::ParseError;
use super::lexer::{Token, TokenKind};

#[derive(Debug, Clone, Copy)]
pub struct TokenStream<'a> {
    pub tokens: &'a [Token],
    pub source: &'a str,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: &'a [Token], source: &'a str) -> Self {
        Self { tokens, source }
    }

    pub fn first(&self) -> Option<&'a Token> {
        self.tokens.first()
    }

    pub fn advance(&self, count: usize) -> Self {
        Self {
            tokens: &self.tokens[count.min(self.tokens.len())..],
            source: self.source,
        }
    }

    pub fn text(&self, span: Span) -> &'a str {
        span.slice(self.source)
    }

    pub fn current_span(&self) -> Span {
        self.first()
            .map(|t| t.span)
            .unwrap_or(Span::empty_at(self.source.len() as u32))
    }

    fn at_eof(&self) -> bool {
        self.first().is_none_or(|t| t.kind == TokenKind::Eof)
    }
}

impl InputLength for TokenStream<'_> {
    fn input_len(&self) -> usize {
        self.tokens.len()
    }
}

pub type PResult<'a, O> = IResult<TokenStream<'a>, O, PError<'a>>;

#[derive(Debug, Clone)]
pub struct PError<'a> {
    pub input: TokenStream<'a>,
    pub kind: PErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PErrorKind {
    Expected(TokenKind),
    ExpectedType,
    UnknownType,
    VoidParameter,
    Nom(ErrorKind),
}

impl<'a> NomParseError<TokenStream<'a>> for PError<'a> {
    fn from_error_kind(input: TokenStream<'a>, kind: ErrorKind) -> Self {
        PError {
            input,
            kind: PErrorKind::Nom(kind),
        }
    }

    fn append(_input: TokenStream<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl PError<'_> {
    pub fn into_parse_error(self) -> ParseError {
        let span = self.input.current_span();
        let found = if self.input.at_eof() {
            None
        } else {
            Some(self.input.text(span).to_string())
        };

        match (self.kind, found) {
            (PErrorKind::Expected(TokenKind::Eof), _) => ParseError::TrailingInput { span },
            (PErrorKind::Expected(TokenKind::RParen), None) => {
                ParseError::UnclosedDelimiter { span }
            }
            (PErrorKind::Expected(kind), None) => ParseError::UnexpectedEof {
                expected: kind.describe().to_string(),
                span,
            },
            (PErrorKind::Expected(kind), Some(found)) => {
                ParseError::expected(kind.describe(), found, span)
            }
            (PErrorKind::ExpectedType, None) => ParseError::UnexpectedEof {
                expected: "type name".to_string(),
                span,
            },
            (PErrorKind::ExpectedType, Some(found)) => {
                ParseError::expected("type name", found, span)
            }
            (PErrorKind::UnknownType, found) => ParseError::UnknownType {
                name: found.unwrap_or_default(),
                span,
            },
            (PErrorKind::VoidParameter, _) => ParseError::VoidParameter { span },
            (PErrorKind::Nom(_), None) => ParseError::UnexpectedEof {
                expected: "signature".to_string(),
                span,
            },
            (PErrorKind::Nom(_), Some(found)) => ParseError::expected("signature", found, span),
        }
    }
}

pub fn fail<'a, O>(input: TokenStream<'a>, kind: PErrorKind) -> PResult<'a, O> {
    Err(nom::Err::Failure(PError { input, kind }))
}

pub fn token(kind: TokenKind) -> impl Fn(TokenStream) -> PResult<Token> {
    move |input: TokenStream| match input.first() {
        Some(tok) if tok.kind == kind => Ok((input.advance(1), *tok)),
        _ => Err(nom::Err::Error(PError {
            input,
            kind: PErrorKind::Expected(kind),
        })),
    }
}

pub fn ident(input: TokenStream<'_>) -> PResult<'_, (&str, Span)> {
    let (rest, tok) = token(TokenKind::Ident)(input)?;
    Ok((rest, (input.text(tok.span), tok.span)))
}
