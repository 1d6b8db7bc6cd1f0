//! Indentation-aware tokenizer.
//!
//! The lexer is driven one token at a time through [`Lexer::next_token`],
//! keeping the most recent token available via [`Lexer::current_token`].
//! Leading whitespace is translated into synthetic `Indent`/`Dedent` tokens,
//! one per call, measured in pairs of spaces. Blank lines and comment-only
//! lines produce no tokens, and two `Newline` tokens never appear in a row.

use thiserror::Error;

use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Indentation must be an even number of spaces at position {position}")]
    OddIndentation { position: usize },
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Integer literal '{literal}' is out of range at position {position}")]
    NumberOutOfRange { literal: String, position: usize },
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Unrecognized escape sequence '\\{escape}' at position {position}")]
    UnknownEscape { escape: char, position: usize },
    #[error("Expected '=' after '!' at position {position}")]
    LoneExclamation { position: usize },
    #[error("Expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },
}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    /// Current nesting depth in logical indent levels (pairs of spaces).
    indent_count: usize,
    current: Token,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer and eagerly reads the first token.
    pub fn new(input: &'a str) -> LexResult<Self> {
        let mut lexer = Self {
            input,
            pos: 0,
            indent_count: 0,
            // The start-of-stream marker doubles as Eof so that leading
            // newlines are suppressed like repeated ones.
            current: Token::Eof,
        };
        lexer.next_token()?;
        Ok(lexer)
    }

    /// The most recently produced token.
    pub fn current_token(&self) -> &Token {
        &self.current
    }

    /// Advances the stream and returns the new current token.
    pub fn next_token(&mut self) -> LexResult<&Token> {
        let token = self.read_token()?;
        self.current = token;
        Ok(&self.current)
    }

    /// Fails unless the current token equals `expected`.
    pub fn expect(&self, expected: &Token) -> LexResult<()> {
        if &self.current == expected {
            Ok(())
        } else {
            Err(LexError::UnexpectedToken {
                expected: expected.to_string(),
                found: self.current.to_string(),
            })
        }
    }

    /// Advances, then fails unless the new current token equals `expected`.
    pub fn expect_next(&mut self, expected: &Token) -> LexResult<()> {
        self.next_token()?;
        self.expect(expected)
    }

    /// Fails unless the current token is an identifier; returns its name.
    pub fn expect_id(&self) -> LexResult<&str> {
        match &self.current {
            Token::Id(name) => Ok(name),
            other => Err(LexError::UnexpectedToken {
                expected: "an identifier".to_string(),
                found: other.to_string(),
            }),
        }
    }

    /// Advances, then fails unless the new current token is an identifier.
    pub fn expect_next_id(&mut self) -> LexResult<&str> {
        self.next_token()?;
        self.expect_id()
    }

    fn read_token(&mut self) -> LexResult<Token> {
        // A Newline, Indent or Dedent as the previous token means the reader
        // sits at the start of a line, where leading whitespace is meaningful.
        if matches!(self.current, Token::Newline | Token::Indent | Token::Dedent)
            && let Some(token) = self.line_indentation()?
        {
            return Ok(token);
        }
        self.read_line_token()
    }

    /// Measures leading whitespace and synthesizes at most one
    /// `Indent`/`Dedent`. Returns `None` once the measured level matches
    /// `indent_count`, leaving the cursor at the first body character.
    fn line_indentation(&mut self) -> LexResult<Option<Token>> {
        loop {
            let line_start = self.pos;
            let mut spaces = 0usize;
            while self.peek_char() == Some(' ') {
                self.consume_char();
                spaces += 1;
            }
            match self.peek_char() {
                // Whitespace-only lines carry no indentation meaning.
                Some('\n') => {
                    self.consume_char();
                    continue;
                }
                Option::None => return Ok(Option::None),
                _ => {}
            }
            if spaces % 2 != 0 {
                return Err(LexError::OddIndentation {
                    position: line_start,
                });
            }
            let level = spaces / 2;
            if level > self.indent_count {
                // Rewind so the next call re-measures until the levels agree;
                // multi-level jumps therefore emit one token per call.
                self.pos = line_start;
                self.indent_count += 1;
                return Ok(Some(Token::Indent));
            }
            if level < self.indent_count {
                self.pos = line_start;
                self.indent_count -= 1;
                return Ok(Some(Token::Dedent));
            }
            return Ok(Option::None);
        }
    }

    fn read_line_token(&mut self) -> LexResult<Token> {
        loop {
            let Some(c) = self.peek_char() else {
                return Ok(self.end_of_input());
            };
            match c {
                ' ' => {
                    self.consume_char();
                }
                '#' => self.skip_comment(),
                '\n' => {
                    self.consume_char();
                    // Consecutive newlines collapse into one, a newline at the
                    // start of the stream is dropped, and a comment-only line
                    // must not leave a Newline behind an Indent/Dedent.
                    if !matches!(
                        self.current,
                        Token::Newline | Token::Eof | Token::Indent | Token::Dedent
                    ) {
                        return Ok(Token::Newline);
                    }
                }
                '"' | '\'' => return self.read_string(c),
                '=' | '!' | '<' | '>' => return self.read_comparison(c),
                c if c.is_ascii_digit() => return self.read_number(),
                c if c.is_ascii_alphabetic() || c == '_' => return Ok(self.read_word()),
                '+' | '-' | '*' | '/' | '.' | ',' | ':' | '(' | ')' => {
                    self.consume_char();
                    return Ok(Token::Char(c));
                }
                _ => {
                    return Err(LexError::UnexpectedCharacter {
                        character: c,
                        position: self.pos,
                    });
                }
            }
        }
    }

    /// End-of-input protocol: flush outstanding dedents one per call, then a
    /// terminating newline unless the line already ended, then `Eof` forever.
    fn end_of_input(&mut self) -> Token {
        if self.indent_count > 0 {
            self.indent_count -= 1;
            return Token::Dedent;
        }
        if !matches!(self.current, Token::Eof | Token::Dedent | Token::Newline) {
            return Token::Newline;
        }
        Token::Eof
    }

    fn skip_comment(&mut self) {
        // The newline itself is left in place so the line still terminates.
        while !matches!(self.peek_char(), Some('\n') | Option::None) {
            self.consume_char();
        }
    }

    fn read_word(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c == '_' || c.is_ascii_alphanumeric()) {
            self.consume_char();
        }
        let word = &self.input[start..self.pos];
        // Identifiers starting with an underscore are never keywords.
        if word.starts_with('_') {
            return Token::Id(word.to_string());
        }
        match word {
            "class" => Token::Class,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "def" => Token::Def,
            "print" => Token::Print,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "None" => Token::None,
            "True" => Token::True,
            "False" => Token::False,
            _ => Token::Id(word.to_string()),
        }
    }

    fn read_number(&mut self) -> LexResult<Token> {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.consume_char();
        }
        let literal = &self.input[start..self.pos];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::NumberOutOfRange {
                literal: literal.to_string(),
                position: start,
            })?;
        Ok(Token::Number(value))
    }

    fn read_string(&mut self, quote: char) -> LexResult<Token> {
        let start = self.pos;
        self.consume_char();
        let mut value = String::new();
        loop {
            let Some(c) = self.consume_char() else {
                return Err(LexError::UnterminatedString { position: start });
            };
            if c == quote {
                return Ok(Token::String(value));
            }
            if c != '\\' {
                value.push(c);
                continue;
            }
            let Some(escaped) = self.consume_char() else {
                return Err(LexError::UnterminatedString { position: start });
            };
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '"' => value.push('"'),
                '\'' => value.push('\''),
                '\\' => value.push('\\'),
                other => {
                    return Err(LexError::UnknownEscape {
                        escape: other,
                        position: self.pos,
                    });
                }
            }
        }
    }

    fn read_comparison(&mut self, first: char) -> LexResult<Token> {
        self.consume_char();
        if self.peek_char() == Some('=') {
            self.consume_char();
            let token = match first {
                '=' => Token::Eq,
                '!' => Token::NotEq,
                '<' => Token::LessOrEq,
                _ => Token::GreaterOrEq,
            };
            return Ok(token);
        }
        match first {
            '=' | '<' | '>' => Ok(Token::Char(first)),
            _ => Err(LexError::LoneExclamation { position: self.pos }),
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

/// Reads the whole input into a token vector ending with `Eof`.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(input)?;
    let mut tokens = vec![lexer.current_token().clone()];
    while !matches!(tokens.last(), Some(Token::Eof)) {
        tokens.push(lexer.next_token()?.clone());
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn id(name: &str) -> Token {
        Token::Id(name.to_string())
    }

    fn string(value: &str) -> Token {
        Token::String(value.to_string())
    }

    #[test]
    fn tokenizes_a_flat_program() {
        let tokens = tokenize("x = 4 + 38\nprint x\n").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                id("x"),
                Token::Char('='),
                Token::Number(4),
                Token::Char('+'),
                Token::Number(38),
                Token::Newline,
                Token::Print,
                id("x"),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn synthesizes_indent_and_dedent_around_blocks() {
        let input = indoc! {"
            if x > 2:
              print \"big\"
            else:
              print \"small\"
        "};
        let tokens = tokenize(input).expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::If,
                id("x"),
                Token::Char('>'),
                Token::Number(2),
                Token::Char(':'),
                Token::Newline,
                Token::Indent,
                Token::Print,
                string("big"),
                Token::Newline,
                Token::Dedent,
                Token::Else,
                Token::Char(':'),
                Token::Newline,
                Token::Indent,
                Token::Print,
                string("small"),
                Token::Newline,
                Token::Dedent,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn multi_level_transitions_emit_one_token_per_call() {
        let input = indoc! {"
            if a:
              if b:
                x = 1
            y = 2
        "};
        let tokens = tokenize(input).expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::If,
                id("a"),
                Token::Char(':'),
                Token::Newline,
                Token::Indent,
                Token::If,
                id("b"),
                Token::Char(':'),
                Token::Newline,
                Token::Indent,
                id("x"),
                Token::Char('='),
                Token::Number(1),
                Token::Newline,
                Token::Dedent,
                Token::Dedent,
                id("y"),
                Token::Char('='),
                Token::Number(2),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn blank_lines_and_comments_produce_no_tokens() {
        let input = indoc! {"
            x = 1  # bind x

            # a full-line comment
            y = 2
        "};
        let tokens = tokenize(input).expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                id("x"),
                Token::Char('='),
                Token::Number(1),
                Token::Newline,
                id("y"),
                Token::Char('='),
                Token::Number(2),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn never_emits_a_newline_after_newline_indent_or_dedent() {
        let input = "\n\nx = 1\n\n\nif y:\n  # lead comment\n  z = 2\n\nw = 3\n\n";
        let tokens = tokenize(input).expect("tokenize");
        let mut previous = Option::<&Token>::None;
        for token in &tokens {
            if matches!(token, Token::Newline) {
                assert!(
                    !matches!(
                        previous,
                        Some(Token::Newline | Token::Indent | Token::Dedent)
                    ),
                    "misplaced newline in {tokens:?}"
                );
            }
            previous = Some(token);
        }
    }

    #[test]
    fn balances_indents_and_dedents() {
        let input = indoc! {"
            class A:
              def m():
                if x:
                  return 1
                return 2
            a = A()
        "};
        let tokens = tokenize(input).expect("tokenize");
        let indents = tokens.iter().filter(|t| **t == Token::Indent).count();
        let dedents = tokens.iter().filter(|t| **t == Token::Dedent).count();
        assert_eq!(indents, dedents);
        assert_eq!(tokens.last(), Some(&Token::Eof));
    }

    #[test]
    fn reads_string_literals_with_both_quotes_and_escapes() {
        let tokens = tokenize("s = \"a\\n'b'\\t\\\\\" + 'c\"d\\''\n").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                id("s"),
                Token::Char('='),
                string("a\n'b'\t\\"),
                Token::Char('+'),
                string("c\"d'"),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unknown_escape_sequences() {
        let err = tokenize("s = \"a\\q\"\n").expect_err("expected escape failure");
        assert!(matches!(err, LexError::UnknownEscape { escape: 'q', .. }));
    }

    #[test]
    fn rejects_unterminated_strings() {
        let err = tokenize("s = \"abc").expect_err("expected unterminated string");
        assert_eq!(err, LexError::UnterminatedString { position: 4 });
    }

    #[test]
    fn rejects_odd_indentation() {
        let input = "if a:\n   x = 1\n";
        let err = tokenize(input).expect_err("expected odd indentation failure");
        assert_eq!(err, LexError::OddIndentation { position: 6 });
    }

    #[test]
    fn rejects_a_lone_exclamation_mark() {
        let err = tokenize("x = !y\n").expect_err("expected failure");
        assert!(matches!(err, LexError::LoneExclamation { .. }));
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        let err = tokenize("n = 99999999999999999999\n").expect_err("expected overflow");
        assert!(matches!(err, LexError::NumberOutOfRange { .. }));
    }

    #[test]
    fn recognizes_keywords_and_underscore_identifiers() {
        let tokens =
            tokenize("class return if else def print and or not None True False _if classes\n")
                .expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Class,
                Token::Return,
                Token::If,
                Token::Else,
                Token::Def,
                Token::Print,
                Token::And,
                Token::Or,
                Token::Not,
                Token::None,
                Token::True,
                Token::False,
                id("_if"),
                id("classes"),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn recognizes_comparison_operators() {
        let tokens = tokenize("a == b != c <= d >= e < f > g\n").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                id("a"),
                Token::Eq,
                id("b"),
                Token::NotEq,
                id("c"),
                Token::LessOrEq,
                id("d"),
                Token::GreaterOrEq,
                id("e"),
                Token::Char('<'),
                id("f"),
                Token::Char('>'),
                id("g"),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn synthesizes_terminating_newline_at_eof() {
        let tokens = tokenize("x = 1").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                id("x"),
                Token::Char('='),
                Token::Number(1),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn flushes_dedents_before_eof_without_extra_newline() {
        let tokens = tokenize("if a:\n  x = 1").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::If,
                id("a"),
                Token::Char(':'),
                Token::Newline,
                Token::Indent,
                id("x"),
                Token::Char('='),
                Token::Number(1),
                Token::Dedent,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn empty_and_blank_inputs_yield_only_eof() {
        assert_eq!(tokenize("").expect("tokenize"), vec![Token::Eof]);
        assert_eq!(tokenize("\n\n\n").expect("tokenize"), vec![Token::Eof]);
        assert_eq!(tokenize("  \n   \n").expect("tokenize"), vec![Token::Eof]);
    }

    #[test]
    fn expect_helpers_check_variant_and_payload() {
        let mut lexer = Lexer::new("count = 42\n").expect("lexer");
        assert_eq!(lexer.expect_id().expect("id"), "count");
        assert!(lexer.expect(&Token::Number(1)).is_err());
        lexer.expect_next(&Token::Char('=')).expect("equals sign");
        lexer.expect_next(&Token::Number(42)).expect("literal");
        let err = lexer.expect_next_id().expect_err("newline is not an id");
        assert_eq!(
            err,
            LexError::UnexpectedToken {
                expected: "an identifier".to_string(),
                found: "Newline".to_string(),
            }
        );
    }

    #[test]
    fn current_token_tracks_the_stream() {
        let mut lexer = Lexer::new("a b\n").expect("lexer");
        assert_eq!(lexer.current_token(), &id("a"));
        assert_eq!(lexer.next_token().expect("next"), &id("b"));
        assert_eq!(lexer.current_token(), &id("b"));
        assert_eq!(lexer.next_token().expect("next"), &Token::Newline);
        assert_eq!(lexer.next_token().expect("next"), &Token::Eof);
        // Eof repeats on every further call.
        assert_eq!(lexer.next_token().expect("next"), &Token::Eof);
    }
}
