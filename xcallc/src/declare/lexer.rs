///
/// Declaration Lexer
///
/// Splits a signature string into identifiers and the four punctuation
/// tokens of the declaration grammar. Whitespace is insignificant. The
/// token list always ends with an Eof token positioned at the end of the
/// input.
///

use crate::source::Span;

use super::error::{ParseError, ParseResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Star,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::Star => "'*'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Comma => "','",
            TokenKind::Eof => "end of input",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        let kind = match ch {
            c if c.is_whitespace() => continue,
            '*' => TokenKind::Star,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start + c.len_utf8();
                while let Some(&(idx, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        end = idx + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident,
                    span: Span::new(start as u32, end as u32),
                });
                continue;
            }
            other => {
                return Err(ParseError::UnexpectedChar {
                    ch: other,
                    span: Span::new(start as u32, (start + other.len_utf8()) as u32),
                });
            }
        };
        tokens.push(Token {
            kind,
            span: Span::new(start as u32, (start + 1) as u32),
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::empty_at(source.len() as u32),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_declaration() {
        assert_eq!(
            kinds("float predict_float(float*, int32)"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Star,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifier_spans() {
        let source = "  double  hypot ( double , double )";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[0].span.slice(source), "double");
        assert_eq!(tokens[1].span.slice(source), "hypot");
        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!(eof.span.start as usize, source.len());
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("int f(int; int)").unwrap_err();
        match err {
            ParseError::UnexpectedChar { ch, span } => {
                assert_eq!(ch, ';');
                assert_eq!(span.start, 9);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
