use super::FilterError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    Dot,
    Comma,
    LParen,
    RParen,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub(super) fn tokenize(src: &str) -> Result<Vec<Spanned>, FilterError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let token = match c {
            b'.' => {
                pos += 1;
                Token::Dot
            }
            b',' => {
                pos += 1;
                Token::Comma
            }
            b'(' => {
                pos += 1;
                Token::LParen
            }
            b')' => {
                pos += 1;
                Token::RParen
            }
            b'!' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                Token::NotEq
            }
            b'!' => {
                pos += 1;
                Token::Bang
            }
            b'&' if bytes.get(pos + 1) == Some(&b'&') => {
                pos += 2;
                Token::AndAnd
            }
            b'|' if bytes.get(pos + 1) == Some(&b'|') => {
                pos += 2;
                Token::OrOr
            }
            b'=' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                Token::EqEq
            }
            b'<' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                Token::Le
            }
            b'<' => {
                pos += 1;
                Token::Lt
            }
            b'>' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                Token::Ge
            }
            b'>' => {
                pos += 1;
                Token::Gt
            }
            b'"' | b'\'' => {
                let (value, end) = string_literal(src, pos)?;
                pos = end;
                Token::Str(value)
            }
            b'-' | b'0'..=b'9' => {
                let mut end = pos + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let text = &src[pos..end];
                let value = text
                    .parse::<i64>()
                    .map_err(|_| FilterError::new(format!("invalid integer {text:?}"), pos))?;
                pos = end;
                Token::Int(value)
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                let mut end = pos + 1;
                while end < bytes.len() && (bytes[end] == b'_' || bytes[end].is_ascii_alphanumeric())
                {
                    end += 1;
                }
                let ident = src[pos..end].to_owned();
                pos = end;
                Token::Ident(ident)
            }
            _ => {
                let ch = src[pos..].chars().next().unwrap_or_default();
                return Err(FilterError::new(format!("unexpected character {ch:?}"), pos));
            }
        };
        tokens.push(Spanned { token, pos: start });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        pos: src.len(),
    });
    Ok(tokens)
}

fn string_literal(src: &str, start: usize) -> Result<(String, usize), FilterError> {
    let mut chars = src[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(FilterError::new("expected string literal", start));
    };
    let mut value = String::new();
    while let Some((offset, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, escaped @ ('\\' | '"' | '\''))) => value.push(escaped),
                Some((at, other)) => {
                    return Err(FilterError::new(
                        format!("unknown escape sequence \\{other}"),
                        start + at,
                    ));
                }
                None => break,
            },
            ch if ch == quote => return Ok((value, start + offset + ch.len_utf8())),
            ch => value.push(ch),
        }
    }
    Err(FilterError::new("unterminated string literal", start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn operators_and_literals() {
        assert_eq!(
            kinds("this.kind != STORY && x <= -3"),
            vec![
                Token::Ident("this".into()),
                Token::Dot,
                Token::Ident("kind".into()),
                Token::NotEq,
                Token::Ident("STORY".into()),
                Token::AndAnd,
                Token::Ident("x".into()),
                Token::Le,
                Token::Int(-3),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\"b""#),
            vec![
                Token::Str("it's".into()),
                Token::Str("a\"b".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn reports_offsets() {
        let err = tokenize("this.hidden = true").unwrap_err();
        assert_eq!(err.offset(), 12);
        assert!(tokenize("'open").is_err());
    }
}
