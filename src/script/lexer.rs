//! Tokenizer for relive script.

use super::{Pos, SyntaxError};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Str(String),
    Num(f64),
    // keywords
    Let,
    Fn,
    Return,
    Throw,
    If,
    Else,
    Import,
    Export,
    From,
    As,
    Default,
    True,
    False,
    Nil,
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    Eof,
}

impl Tok {
    /// Human-readable form used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier `{name}`"),
            Self::Str(_) => "string literal".to_string(),
            Self::Num(n) => format!("number `{n}`"),
            Self::Eof => "end of input".to_string(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Let => "let",
            Self::Fn => "fn",
            Self::Return => "return",
            Self::Throw => "throw",
            Self::If => "if",
            Self::Else => "else",
            Self::Import => "import",
            Self::Export => "export",
            Self::From => "from",
            Self::As => "as",
            Self::Default => "default",
            Self::True => "true",
            Self::False => "false",
            Self::Nil => "nil",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Semi => ";",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Assign => "=",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Ident(_) | Self::Str(_) | Self::Num(_) | Self::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub pos: Pos,
}

fn keyword(word: &str) -> Option<Tok> {
    Some(match word {
        "let" | "const" | "var" => Tok::Let,
        "fn" | "function" => Tok::Fn,
        "return" => Tok::Return,
        "throw" => Tok::Throw,
        "if" => Tok::If,
        "else" => Tok::Else,
        "import" => Tok::Import,
        "export" => Tok::Export,
        "from" => Tok::From,
        "as" => Tok::As,
        "default" => Tok::Default,
        "true" => Tok::True,
        "false" => Tok::False,
        "nil" | "null" | "undefined" => Tok::Nil,
        _ => return None,
    })
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and comments. Fails on an unterminated block comment.
    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.next() {
                        Some('/') => {
                            while let Some(c) = self.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.bump();
                            }
                        }
                        Some('*') => {
                            let start = self.pos();
                            self.bump();
                            self.bump();
                            loop {
                                match self.bump() {
                                    Some('*') if self.peek() == Some('/') => {
                                        self.bump();
                                        break;
                                    }
                                    Some(_) => {}
                                    None => {
                                        return Err(SyntaxError::new(
                                            "unterminated block comment",
                                            start,
                                        ));
                                    }
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, quote: char, start: Pos) -> Result<Tok, SyntaxError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(SyntaxError::new("unterminated string literal", start));
                }
                Some(c) if c == quote => return Ok(Tok::Str(value)),
                Some('\\') => {
                    let escape_pos = self.pos();
                    let c = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('u') => self.unicode_escape(escape_pos)?,
                        Some(c @ ('\\' | '"' | '\'' | '/')) => c,
                        _ => return Err(SyntaxError::new("invalid escape sequence", escape_pos)),
                    };
                    value.push(c);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn unicode_escape(&mut self, at: Pos) -> Result<char, SyntaxError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| SyntaxError::new("invalid unicode escape", at))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| SyntaxError::new("invalid unicode escape", at))
    }

    fn number(&mut self, first: char, start: Pos) -> Result<Tok, SyntaxError> {
        let mut text = String::from(first);
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.bump();
                if c != '_' {
                    text.push(c);
                }
            } else if c == '.' && !seen_dot {
                // `1.foo` is a member access, not a fraction
                let mut ahead = self.chars.clone();
                ahead.next();
                if !ahead.next().is_some_and(|d| d.is_ascii_digit()) {
                    break;
                }
                seen_dot = true;
                self.bump();
                text.push('.');
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(Tok::Num)
            .map_err(|_| SyntaxError::new(format!("invalid number `{text}`"), start))
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_trivia()?;
        let pos = self.pos();
        let Some(c) = self.bump() else {
            return Ok(Token { tok: Tok::Eof, pos });
        };

        let tok = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            ',' => Tok::Comma,
            ';' => Tok::Semi,
            ':' => Tok::Colon,
            '.' => Tok::Dot,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '=' => {
                if self.eat('=') {
                    self.eat('=');
                    Tok::Eq
                } else {
                    Tok::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    self.eat('=');
                    Tok::NotEq
                } else {
                    Tok::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    Tok::LtEq
                } else {
                    Tok::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Tok::GtEq
                } else {
                    Tok::Gt
                }
            }
            '&' if self.eat('&') => Tok::AndAnd,
            '|' if self.eat('|') => Tok::OrOr,
            '"' | '\'' => self.string(c, pos)?,
            c if c.is_ascii_digit() => self.number(c, pos)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut word = String::from(c);
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        word.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                keyword(&word).unwrap_or(Tok::Ident(word))
            }
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character `{other}`"),
                    pos,
                ));
            }
        };
        Ok(Token { tok, pos })
    }
}

/// Tokenize a whole source file. The last token is always `Tok::Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.tok == Tok::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_keywords_and_aliases() {
        assert_eq!(
            kinds("function const null"),
            vec![Tok::Fn, Tok::Let, Tok::Nil, Tok::Eof]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a === b != c && d || !e <= 1"),
            vec![
                Tok::Ident("a".into()),
                Tok::Eq,
                Tok::Ident("b".into()),
                Tok::NotEq,
                Tok::Ident("c".into()),
                Tok::AndAnd,
                Tok::Ident("d".into()),
                Tok::OrOr,
                Tok::Bang,
                Tok::Ident("e".into()),
                Tok::LtEq,
                Tok::Num(1.0),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_track_lines() {
        let tokens = tokenize("let a = 1;\n  b").unwrap();
        let b = &tokens[5];
        assert_eq!(b.tok, Tok::Ident("b".into()));
        assert_eq!(b.pos, Pos::new(2, 3));
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("// line\n/* block\n */ 2 / 1"),
            vec![Tok::Num(2.0), Tok::Slash, Tok::Num(1.0), Tok::Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "aA\n""#),
            vec![Tok::Str("it's".into()), Tok::Str("aA\n".into()), Tok::Eof]
        );
    }

    #[test]
    fn test_number_member_access() {
        assert_eq!(
            kinds("1.5 2.x"),
            vec![
                Tok::Num(1.5),
                Tok::Num(2.0),
                Tok::Dot,
                Tok::Ident("x".into()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("let s = \"abc").unwrap_err();
        assert_eq!(err.pos, Pos::new(1, 9));
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a # b").unwrap_err();
        assert_eq!(err.pos, Pos::new(1, 3));
    }
}
