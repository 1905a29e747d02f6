//! Scanner turning source text into a token stream.
//!
//! Lexical rules, in matching priority order:
//! - `#` starts a comment running to end of line; the line break counts as
//!   a separator
//! - `"..."` emits one number token per byte of content, which is how
//!   programs embed character tables; `\"` does not close the literal
//! - `,` and any whitespace after it vanish entirely, joining literals
//!   into one statement without a separator
//! - `=` is the declaration marker and swallows trailing whitespace, so a
//!   body may start on the next line
//! - numbers are `\d*\.?\d+` with an optional `e`-exponent, never signed
//! - `$3` is an argument reference, `$name` a function reference
//! - whitespace runs collapse to a single separator
//! - any other accepted character is a one-character operator
//!
//! Anything else is an [`InvalidCharacter`](CompileErrorKind::InvalidCharacter)
//! error. The output always starts and ends with a separator.

use scrawl_graphics::types::Scalar;

use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::program::op_from_char;
use crate::token::{Span, Token, TokenKind};

/// Tokenize `source` into a separator-delimited token stream.
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
    Scanner::new(source).run()
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> CompileResult<Vec<Token>> {
        self.push_sep(Span::at(0));
        while self.pos < self.src.len() {
            self.next_token()?;
        }
        self.push_sep(Span::at(self.src.len()));
        Ok(self.tokens)
    }

    fn next_token(&mut self) -> CompileResult<()> {
        let start = self.pos;
        let c = self.src[start];
        match c {
            b'#' => {
                while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                    self.pos += 1;
                }
                if self.pos < self.src.len() {
                    self.pos += 1;
                }
                self.push_sep(Span::new(start, self.pos));
            }
            b'"' => self.string_literal(start)?,
            b',' => {
                self.pos += 1;
                self.skip_whitespace();
            }
            b'=' => {
                self.pos += 1;
                self.push(TokenKind::Decl, Span::new(start, self.pos));
                self.skip_whitespace();
            }
            b'$' => self.dollar(start)?,
            c if c.is_ascii_whitespace() => {
                self.skip_whitespace();
                self.push_sep(Span::new(start, self.pos));
            }
            c if c.is_ascii_digit() => self.number(start)?,
            b'.' if self.peek(1).is_some_and(|b| b.is_ascii_digit()) => self.number(start)?,
            c if op_from_char(c as char).is_some() || c == b'?' => {
                self.pos += 1;
                self.push(TokenKind::Op(c as char), Span::new(start, self.pos));
            }
            _ => {
                return Err(CompileError::new(
                    CompileErrorKind::InvalidCharacter,
                    format!("unexpected character {:?}", char::from(c)),
                    Span::new(start, start + 1),
                ));
            }
        }
        Ok(())
    }

    /// Each content byte becomes its own number token. The backslash of a
    /// `\"` escape is kept as a literal byte, matching the table format
    /// programs index with `@`.
    fn string_literal(&mut self, start: usize) -> CompileResult<()> {
        let mut end = start + 1;
        loop {
            match self.src.get(end) {
                Some(b'"') if self.src[end - 1] != b'\\' => break,
                Some(b'\n') | None => {
                    return Err(CompileError::new(
                        CompileErrorKind::UnterminatedString,
                        "unterminated string literal",
                        Span::new(start, end),
                    ));
                }
                Some(_) => end += 1,
            }
        }
        for i in start + 1..end {
            self.push(
                TokenKind::Number(Scalar::from(self.src[i])),
                Span::new(i, i + 1),
            );
        }
        self.pos = end + 1;
        Ok(())
    }

    fn dollar(&mut self, start: usize) -> CompileResult<()> {
        self.pos += 1;
        if self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
            while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
            let span = Span::new(start, self.pos);
            let digits = &self.src[start + 1..self.pos];
            let text = std::str::from_utf8(digits).unwrap_or("");
            let slot = text.parse::<usize>().map_err(|_| {
                CompileError::new(
                    CompileErrorKind::InvalidCharacter,
                    "argument index is too large",
                    span,
                )
            })?;
            self.push(TokenKind::Arg(slot), span);
        } else if self.peek(0).is_some_and(is_word_byte) {
            while self.peek(0).is_some_and(is_word_byte) {
                self.pos += 1;
            }
            let name = &self.src[start + 1..self.pos];
            let name = std::str::from_utf8(name).unwrap_or("").to_owned();
            self.push(TokenKind::FuncRef(name), Span::new(start, self.pos));
        } else {
            // bare `$` is the dynamic argument-fetch operator
            self.push(TokenKind::Op('$'), Span::new(start, self.pos));
        }
        Ok(())
    }

    fn number(&mut self, start: usize) -> CompileResult<()> {
        while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek(0) == Some(b'.') && self.peek(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        // exponent, only when a digit follows the sign
        if self.peek(0) == Some(b'e') {
            let sign = usize::from(matches!(self.peek(1), Some(b'+' | b'-')));
            if self.peek(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 2 + sign;
                while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let span = Span::new(start, self.pos);
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        let value = text.parse::<Scalar>().map_err(|_| {
            CompileError::new(
                CompileErrorKind::InvalidCharacter,
                format!("malformed number {text:?}"),
                span,
            )
        })?;
        self.push(TokenKind::Number(value), span);
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        while self.peek(0).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn push(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token { kind, span });
    }

    /// Push a separator unless the previous token already is one.
    fn push_sep(&mut self, span: Span) {
        if !matches!(self.tokens.last(), Some(t) if t.kind.is_sep()) {
            self.push(TokenKind::Sep, span);
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn stream_is_separator_delimited() {
        assert_eq!(
            kinds(">"),
            vec![TokenKind::Sep, TokenKind::Op('>'), TokenKind::Sep]
        );
        assert_eq!(kinds(""), vec![TokenKind::Sep]);
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(
            kinds(">  \n\t <"),
            vec![
                TokenKind::Sep,
                TokenKind::Op('>'),
                TokenKind::Sep,
                TokenKind::Op('<'),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn numbers_and_exponents() {
        assert_eq!(
            kinds("12 3.5 .25 1e3 2e-2"),
            vec![
                TokenKind::Sep,
                TokenKind::Number(12.0),
                TokenKind::Sep,
                TokenKind::Number(3.5),
                TokenKind::Sep,
                TokenKind::Number(0.25),
                TokenKind::Sep,
                TokenKind::Number(1000.0),
                TokenKind::Sep,
                TokenKind::Number(0.02),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn adjacent_number_and_operator_split() {
        assert_eq!(
            kinds("1r4"),
            vec![
                TokenKind::Sep,
                TokenKind::Number(1.0),
                TokenKind::Op('r'),
                TokenKind::Number(4.0),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn comma_joins_without_separator() {
        assert_eq!(
            kinds("65, 66,0"),
            vec![
                TokenKind::Sep,
                TokenKind::Number(65.0),
                TokenKind::Number(66.0),
                TokenKind::Number(0.0),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn dollar_tokens() {
        assert_eq!(
            kinds("$2 $fn_1 $"),
            vec![
                TokenKind::Sep,
                TokenKind::Arg(2),
                TokenKind::Sep,
                TokenKind::FuncRef("fn_1".into()),
                TokenKind::Sep,
                TokenKind::Op('$'),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn arg_reference_stops_at_first_letter() {
        // digits bind to the argument reference, the rest lexes separately
        assert_eq!(
            kinds("$2x"),
            vec![
                TokenKind::Sep,
                TokenKind::Arg(2),
                TokenKind::Op('x'),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn declaration_swallows_trailing_whitespace() {
        assert_eq!(
            kinds("1$f= \n>"),
            vec![
                TokenKind::Sep,
                TokenKind::Number(1.0),
                TokenKind::FuncRef("f".into()),
                TokenKind::Decl,
                TokenKind::Op('>'),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn comments_act_as_separators() {
        assert_eq!(
            kinds("> # to the right\n<"),
            vec![
                TokenKind::Sep,
                TokenKind::Op('>'),
                TokenKind::Sep,
                TokenKind::Op('<'),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn string_literal_emits_byte_codes() {
        assert_eq!(
            kinds("\"AB\""),
            vec![
                TokenKind::Sep,
                TokenKind::Number(65.0),
                TokenKind::Number(66.0),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn escaped_quote_stays_in_string() {
        assert_eq!(
            kinds(r#""a\"""#),
            vec![
                TokenKind::Sep,
                TokenKind::Number(97.0),
                TokenKind::Number(92.0),
                TokenKind::Number(34.0),
                TokenKind::Sep
            ]
        );
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let err = tokenize("\"abc").expect_err("must fail");
        assert_eq!(err.kind, CompileErrorKind::UnterminatedString);
    }

    #[test]
    fn unknown_character_is_rejected() {
        let err = tokenize("1 & 2").expect_err("must fail");
        assert_eq!(err.kind, CompileErrorKind::InvalidCharacter);
        assert_eq!(err.span, Some(Span::new(2, 3)));
    }

    #[test]
    fn spans_track_byte_offsets() {
        let tokens = tokenize("12 $f").expect("tokenize");
        assert_eq!(tokens[1].span, Span::new(0, 2));
        assert_eq!(tokens[3].span, Span::new(3, 5));
    }
}
