//! Tokenizer for secret expressions

use crate::errors::{KeystashError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal with its source text
    Number(f64, String),
    Str(String),
    Ident(String),
    True,
    False,
    Nil,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    EqEq,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,

    AndAnd,
    OrOr,
    Bang,

    Question,
    Colon,
    LParen,
    RParen,
    Comma,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(_, text) => format!("number {}", text),
            Token::Str(s) => format!("string {:?}", s),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Nil => "'nil'".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::EqEq => "==",
            Token::BangEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Question => "?",
            Token::Colon => ":",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            _ => "",
        }
    }
}

fn error(message: impl Into<String>) -> KeystashError {
    KeystashError::evaluation(message)
}

/// Split an expression into tokens
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        let starts_number = c.is_ascii_digit() || (c == '.' && next_is_digit);
        if starts_number {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent: 1e9, 2.5E-3
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value =
                text.parse::<f64>().map_err(|_| error(format!("invalid number '{}'", text)))?;
            tokens.push(Token::Number(value, text));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "nil" | "null" => Token::Nil,
                "and" => Token::AndAnd,
                "or" => Token::OrOr,
                "not" => Token::Bang,
                _ => Token::Ident(word),
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::BangEq, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('?', _) => (Token::Question, 1),
            (':', _) => (Token::Colon, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            _ => return Err(error(format!("unexpected character '{}' at offset {}", c, i))),
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

/// Read a quoted string starting at `start`; returns the text and the index after the closing quote
fn read_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\\' => {
                let escaped =
                    chars.get(i + 1).ok_or_else(|| error("unterminated escape sequence"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    other => return Err(error(format!("unknown escape sequence '\\{}'", other))),
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Err(error("unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_operators_and_literals() {
        let tokens = tokenize("A + 'x' >= 2.5 && !b").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("A".to_string()),
                Token::Plus,
                Token::Str("x".to_string()),
                Token::Ge,
                Token::Number(2.5, "2.5".to_string()),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords() {
        let tokens = tokenize("true and not false or nil").unwrap();
        assert_eq!(
            tokens,
            vec![Token::True, Token::AndAnd, Token::Bang, Token::False, Token::OrOr, Token::Nil]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#""a\"b\n""#).unwrap();
        assert_eq!(tokens, vec![Token::Str("a\"b\n".to_string())]);
        assert!(tokenize("\"open").is_err());
        assert!(tokenize(r#""\q""#).is_err());
    }

    #[test]
    fn test_numbers_keep_source_text() {
        let tokens = tokenize("1e3 .5 10").unwrap();
        assert_eq!(tokens[0], Token::Number(1000.0, "1e3".to_string()));
        assert_eq!(tokens[1], Token::Number(0.5, ".5".to_string()));
        assert!(tokenize("1.2.3").is_err());
    }

    #[test]
    fn test_rejects_unknown_characters() {
        assert!(tokenize("a $ b").is_err());
        assert!(tokenize("a = b").is_err());
    }
}
