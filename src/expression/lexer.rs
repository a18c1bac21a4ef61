use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Str(String),
    /// Bare or backtick-quoted field name. `quoted` names never act as keywords.
    Name { name: String, quoted: bool },
    /// `$name`; `$` alone is the empty name and `$$` is `"$"`
    Variable(String),
    True,
    False,
    Null,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Question,
    Colon,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut lexer = Lexer {
        chars: source.char_indices().collect(),
        index: 0,
        len: source.len(),
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer {
    chars: Vec<(usize, char)>,
    index: usize,
    len: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).map(|(_, c)| *c)
    }

    fn position(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(pos, _)| *pos)
            .unwrap_or(self.len)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.index += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ExpressionError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.position();
                    self.index += 2;
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(ExpressionError::syntax(start, "unterminated comment"))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        self.skip_whitespace_and_comments()?;
        let position = self.position();
        let Some(c) = self.bump() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position,
            });
        };

        let kind = match c {
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Eq,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '&' => TokenKind::Amp,
            '!' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::Ne
            }
            '<' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::Le
            }
            '<' => TokenKind::Lt,
            '>' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::Ge
            }
            '>' => TokenKind::Gt,
            '"' | '\'' => TokenKind::Str(self.string(c, position)?),
            '`' => {
                let mut name = String::new();
                loop {
                    match self.bump() {
                        Some('`') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(ExpressionError::syntax(
                                position,
                                "unterminated quoted name",
                            ))
                        }
                    }
                }
                TokenKind::Name { name, quoted: true }
            }
            '$' => {
                if self.peek() == Some('$') {
                    self.bump();
                    TokenKind::Variable("$".to_string())
                } else {
                    TokenKind::Variable(self.identifier(String::new()))
                }
            }
            c if c.is_ascii_digit() => TokenKind::Number(self.number(c, position)?),
            c if is_name_start(c) => {
                let name = self.identifier(c.to_string());
                match name.as_str() {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    _ => TokenKind::Name {
                        name,
                        quoted: false,
                    },
                }
            }
            other => {
                return Err(ExpressionError::syntax(
                    position,
                    format!("unexpected character '{other}'"),
                ))
            }
        };

        Ok(Token { kind, position })
    }

    fn identifier(&mut self, mut name: String) -> String {
        while let Some(c) = self.peek() {
            if is_name_continue(c) {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    fn number(&mut self, first: char, position: usize) -> Result<f64, ExpressionError> {
        let mut text = first.to_string();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // A dot only belongs to the number when a digit follows, so `a.0` style paths stay paths
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = self.peek_at(1);
            let digit_offset = if matches!(sign, Some('+') | Some('-')) { 2 } else { 1 };
            if self.peek_at(digit_offset).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_offset {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        text.parse::<f64>()
            .map_err(|_| ExpressionError::syntax(position, format!("invalid number '{text}'")))
    }

    fn string(&mut self, quote: char, position: usize) -> Result<String, ExpressionError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ExpressionError::syntax(position, "unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| ExpressionError::syntax(position, "unterminated string"))?;
                    match escaped {
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{0008}'),
                        'f' => out.push('\u{000C}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => {
                            let mut hex = String::with_capacity(4);
                            for _ in 0..4 {
                                match self.bump() {
                                    Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                                    _ => {
                                        return Err(ExpressionError::syntax(
                                            position,
                                            "invalid unicode escape",
                                        ))
                                    }
                                }
                            }
                            let code = u32::from_str_radix(&hex, 16).map_err(|_| {
                                ExpressionError::syntax(position, "invalid unicode escape")
                            })?;
                            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        }
                        other => {
                            return Err(ExpressionError::syntax(
                                position,
                                format!("unsupported escape sequence '\\{other}'"),
                            ))
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn name(n: &str) -> TokenKind {
        TokenKind::Name {
            name: n.to_string(),
            quoted: false,
        }
    }

    #[test]
    fn test_path_and_comparison() {
        assert_eq!(
            kinds("extract.v = true"),
            vec![
                name("extract"),
                TokenKind::Dot,
                name("v"),
                TokenKind::Eq,
                TokenKind::True,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 3e2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(300.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb" "A""#),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Str("a\nb".into()),
                TokenKind::Str("A".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_variables_and_quoted_names() {
        assert_eq!(
            kinds("$ $$ $exists `and`"),
            vec![
                TokenKind::Variable(String::new()),
                TokenKind::Variable("$".into()),
                TokenKind::Variable("exists".into()),
                TokenKind::Name {
                    name: "and".into(),
                    quoted: true
                },
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_two_char_operators_and_comments() {
        assert_eq!(
            kinds("a /* note */ != b <= c >= d"),
            vec![
                name("a"),
                TokenKind::Ne,
                name("b"),
                TokenKind::Le,
                name("c"),
                TokenKind::Ge,
                name("d"),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_errors_carry_position() {
        match tokenize("a = 'open") {
            Err(ExpressionError::Syntax { position, .. }) => assert_eq!(position, 4),
            other => panic!("expected syntax error, got {other:?}"),
        }
        assert!(tokenize("a # b").is_err());
        assert!(tokenize("/* never closed").is_err());
    }
}
