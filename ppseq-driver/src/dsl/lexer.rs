use ppseq_core::defined::suffix_exponent;

use crate::error::ParseError;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Number { text: String, value: f64 },
    Word(String),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Eq,
    Colon,
    Star,
    Minus,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number { text, .. } => write!(f, "{}", text),
            Token::Word(w) => write!(f, "{}", w),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::Comma => write!(f, "','"),
            Token::Eq => write!(f, "'='"),
            Token::Colon => write!(f, "':'"),
            Token::Star => write!(f, "'*'"),
            Token::Minus => write!(f, "'-'"),
        }
    }
}

const fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn number(text: &str, value: f64) -> Token {
    Token::Number {
        text: text.to_owned(),
        value,
    }
}

/// Converts the mantissa digits, an exponent and a time unit to canonical text.
///
/// `100ps` becomes `100e-12`; `1E+3` becomes `1e3`.
fn canonical_number(raw: &str, digits: &str, exp: i32) -> Result<Token, ParseError> {
    let text = if exp == 0 {
        digits.to_owned()
    } else {
        format!("{digits}e{exp}")
    };
    let value = text
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(raw.to_owned()))?;
    Ok(Token::Number { text, value })
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars = input.char_indices().collect::<Vec<_>>();
    let at = |i: usize| chars.get(i).map(|&(_, c)| c);
    let pos = |i: usize| chars.get(i).map_or(input.len(), |&(p, _)| p);

    let mut tokens = Vec::new();
    let mut i = 0;
    while let Some(c) = at(i) {
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => i += 1,
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '=' | ':' | '*' | '-' => {
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    ',' => Token::Comma,
                    '=' => Token::Eq,
                    ':' => Token::Colon,
                    '*' => Token::Star,
                    _ => Token::Minus,
                });
                i += 1;
            }
            '\'' | '"' => {
                let start = i;
                i += 1;
                while at(i).is_some_and(|x| x != c) {
                    i += 1;
                }
                if at(i).is_none() {
                    return Err(ParseError::UnterminatedString(pos(start)));
                }
                tokens.push(Token::Str(input[pos(start + 1)..pos(i)].to_owned()));
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '.' && at(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                while at(i).is_some_and(|d| d.is_ascii_digit() || d == '.') {
                    i += 1;
                }
                let digits = &input[pos(start)..pos(i)];
                let mut exp = 0i32;
                if at(i).is_some_and(|e| e == 'e' || e == 'E') {
                    let mut j = i + 1;
                    if at(j).is_some_and(|s| s == '+' || s == '-') {
                        j += 1;
                    }
                    if at(j).is_some_and(|d| d.is_ascii_digit()) {
                        while at(j).is_some_and(|d| d.is_ascii_digit()) {
                            j += 1;
                        }
                        exp = input[pos(i + 1)..pos(j)]
                            .trim_start_matches('+')
                            .parse()
                            .map_err(|_| ParseError::InvalidNumber(input[pos(start)..pos(j)].to_owned()))?;
                        i = j;
                    }
                }
                let unit_start = i;
                while at(i).is_some_and(is_word_char) {
                    i += 1;
                }
                let raw = &input[pos(start)..pos(i)];
                let unit = &input[pos(unit_start)..pos(i)];
                if !unit.is_empty() {
                    exp += suffix_exponent(unit).ok_or_else(|| ParseError::InvalidNumber(raw.to_owned()))?;
                }
                tokens.push(canonical_number(raw, digits, exp)?);
            }
            c if is_word_start(c) => {
                let start = i;
                while at(i).is_some_and(is_word_char) {
                    i += 1;
                }
                let word = &input[pos(start)..pos(i)];
                tokens.push(match word {
                    "nan" | "NaN" => number("nan", f64::NAN),
                    "inf" => number("inf", f64::INFINITY),
                    "True" | "true" => number("1", 1.),
                    "False" | "false" => number("0", 0.),
                    _ => Token::Word(word.to_owned()),
                });
            }
            ch => {
                return Err(ParseError::UnexpectedChar { pos: pos(i), ch });
            }
        }
    }
    Ok(tokens)
}
