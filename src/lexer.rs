//! Lexer: source text -> token stream (spec §4.1).
//!
//! Single-pass character scanner. Fails fast on the first unrecognized
//! character or unterminated string, matching the rest of the pipeline's
//! no-error-recovery contract.

use crate::error::{LexError, Position};
use crate::token::{Token, TokenKind, keyword_kind};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

impl Lexer {
    fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, column) = (self.line, self.column);
            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, "", line, column));
                break;
            };

            let token = if ch == '_' || ch.is_ascii_alphabetic() {
                self.scan_identifier_or_keyword(line, column)
            } else if ch.is_ascii_digit() {
                self.scan_number(line, column)
            } else if ch == 'D' && matches!(self.peek_at(1), Some('"') | Some('\'')) {
                self.scan_string(line, column, true)?
            } else if ch == '"' || ch == '\'' {
                self.scan_string(line, column, false)?
            } else if ch == '@' {
                self.scan_annotation(line, column)
            } else {
                self.scan_operator(line, column)?
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.chars[self.pos..]
            .iter()
            .collect::<String>()
            .starts_with(s)
    }

    /// Skip whitespace, `//` line comments, and non-nesting `/* */` block
    /// comments (spec §4.1).
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    loop {
                        if self.starts_with("*/") {
                            self.advance();
                            self.advance();
                            break;
                        }
                        if self.advance().is_none() {
                            return Err(LexError {
                                message: "Unterminated block comment".to_string(),
                                at: Position::new(line, column),
                            });
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn scan_identifier_or_keyword(&mut self, line: usize, column: usize) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let kind = keyword_kind(&lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, lexeme, line, column)
    }

    /// Digit run, with a single `.` promoting to float (spec §4.1: no
    /// exponent notation).
    fn scan_number(&mut self, line: usize, column: usize) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut kind = TokenKind::IntLiteral;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            kind = TokenKind::FloatLiteral;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        Token::new(kind, lexeme, line, column)
    }

    /// `D"…"`/`D'…'` (dynamic) or `"…"`/`'…'` (regular) string literal.
    /// The raw contents (escapes already resolved) become the lexeme; the
    /// quote character is not retained.
    fn scan_string(&mut self, line: usize, column: usize, dynamic: bool) -> Result<Token, LexError> {
        if dynamic {
            self.advance(); // consume 'D'
        }
        let quote = self.advance().expect("caller verified quote present");
        let mut value = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(LexError {
                        message: format!("Unterminated string at line {}, column {}", line, column),
                        at: Position::new(line, column),
                    });
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some(c) if c == quote => value.push(quote),
                    Some(other) => {
                        return Err(LexError {
                            message: format!("Unknown escape sequence '\\{}' in string literal", other),
                            at: Position::new(self.line, self.column),
                        });
                    }
                    None => {
                        return Err(LexError {
                            message: format!("Unterminated string at line {}, column {}", line, column),
                            at: Position::new(line, column),
                        });
                    }
                },
                Some(c) => value.push(c),
            }
        }
        let kind = if dynamic {
            TokenKind::DStringLiteral
        } else {
            TokenKind::StringLiteral
        };
        Ok(Token::new(kind, value, line, column))
    }

    /// `@name` or `@name(key=true|false, …)`; captures the whole annotation
    /// text including balanced parentheses (spec §4.1).
    fn scan_annotation(&mut self, line: usize, column: usize) -> Token {
        let start = self.pos;
        self.advance(); // '@'
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        if self.peek() == Some('(') {
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    Some('(') => {
                        depth += 1;
                        self.advance();
                    }
                    Some(')') => {
                        depth -= 1;
                        self.advance();
                        if depth == 0 {
                            break;
                        }
                    }
                    Some(_) => {
                        self.advance();
                    }
                    None => break,
                }
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        Token::new(TokenKind::Annotation, lexeme, line, column)
    }

    fn scan_operator(&mut self, line: usize, column: usize) -> Result<Token, LexError> {
        use TokenKind::*;
        // Longest match first.
        const THREE: &[(&str, TokenKind)] = &[];
        let _ = THREE;
        const TWO: &[(&str, TokenKind)] = &[
            ("++", PlusPlus),
            ("--", MinusMinus),
            ("+=", PlusEq),
            ("-=", MinusEq),
            ("/=", SlashEq),
            ("%=", PercentEq),
            ("==", EqEq),
            ("!=", NotEq),
            ("<=", LtEq),
            (">=", GtEq),
            ("&&", AndAnd),
            ("||", OrOr),
            ("->", Arrow),
        ];
        for (text, kind) in TWO {
            if self.starts_with(text) {
                self.advance();
                self.advance();
                return Ok(Token::new(kind.clone(), *text, line, column));
            }
        }
        const ONE: &[(char, TokenKind)] = &[
            ('+', Plus),
            ('-', Minus),
            ('*', Star),
            ('/', Slash),
            ('%', Percent),
            ('=', Eq),
            ('!', Bang),
            ('<', Lt),
            ('>', Gt),
            ('&', Amp),
            ('|', Pipe),
            ('^', Caret),
            ('(', LParen),
            (')', RParen),
            ('{', LBrace),
            ('}', RBrace),
            ('[', LBracket),
            (']', RBracket),
            (',', Comma),
            ('.', Dot),
            (':', Colon),
            (';', Semicolon),
        ];
        let ch = self.peek().unwrap();
        for (c, kind) in ONE {
            if ch == *c {
                self.advance();
                return Ok(Token::new(kind.clone(), c.to_string(), line, column));
            }
        }
        Err(LexError {
            message: format!("Unrecognized character '{}'", ch),
            at: Position::new(line, column),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        assert_eq!(
            kinds("class Hospital private var n"),
            vec![Class, Identifier, Private, Var, Identifier, Eof]
        );
    }

    #[test]
    fn lexes_regular_and_dstring() {
        let tokens = lex(r#""abc" D"count is {c}""#).unwrap();
        assert_eq!(tokens[0].kind, StringLiteral);
        assert_eq!(tokens[0].lexeme, "abc");
        assert_eq!(tokens[1].kind, DStringLiteral);
        assert_eq!(tokens[1].lexeme, "count is {c}");
    }

    #[test]
    fn lexes_numbers() {
        let tokens = lex("42 3.14 7.").unwrap();
        assert_eq!(tokens[0].kind, IntLiteral);
        assert_eq!(tokens[1].kind, FloatLiteral);
        assert_eq!(tokens[1].lexeme, "3.14");
        // A trailing '.' with no following digit is not promoted to float.
        assert_eq!(tokens[2].kind, IntLiteral);
        assert_eq!(tokens[3].kind, Dot);
    }

    #[test]
    fn lexes_annotation_with_args() {
        let tokens = lex("@attr(readOnly=true, serializable=false)").unwrap();
        assert_eq!(tokens[0].kind, Annotation);
        assert_eq!(tokens[0].lexeme, "@attr(readOnly=true, serializable=false)");
    }

    #[test]
    fn longest_match_operators() {
        assert_eq!(kinds("++ += == <= && -> ^"), vec![
            PlusPlus, PlusEq, EqEq, LtEq, AndAnd, Arrow, Caret, Eof
        ]);
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("// line\nvar /* block\nspanning */ x"),
            vec![Var, Identifier, Eof]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = lex("var s: str = \"abc").unwrap_err();
        assert!(err.message.contains("Unterminated string"));
    }

    #[test]
    fn unrecognized_character_is_an_error() {
        let err = lex("var s = `").unwrap_err();
        assert!(err.message.contains("Unrecognized character"));
    }
}
