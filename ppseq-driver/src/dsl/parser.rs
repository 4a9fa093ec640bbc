use super::{
    ast::Expr,
    lexer::{tokenize, Token},
    MAX_DEPTH,
};
use crate::error::ParseError;

/// Keys whose `0`/`1` digit strings are bit patterns rather than numbers.
const BINARY_KEYS: [&str; 3] = ["S", "SEQ", "enable"];

/// Quotes `0`/`1` digit strings given for bit pattern keys.
fn binary(key: &str, value: Expr) -> Expr {
    match value {
        Expr::Number { text, .. }
            if BINARY_KEYS.contains(&key) && text.chars().all(|c| c == '0' || c == '1') =>
        {
            Expr::Str(text)
        }
        v => v,
    }
}

enum Arg {
    Positional(Expr),
    Keyword(String, Expr),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ParseError::UnexpectedEnd(expected))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ParseError> {
        match self.next(expected)? {
            t if t == token => Ok(()),
            t => Err(ParseError::UnexpectedToken {
                expected,
                found: t.to_string(),
            }),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Parses comma separated arguments up to `close`, which is consumed. Returns whether a trailing comma was present.
    fn args(&mut self, close: Option<Token>) -> Result<(Vec<Arg>, bool), ParseError> {
        let mut args = Vec::new();
        let mut trailing = false;
        loop {
            if self.peek() == close.as_ref() {
                break;
            }
            args.push(self.arg()?);
            trailing = false;
            if self.eat(&Token::Comma) {
                trailing = true;
                continue;
            }
            if self.peek() != close.as_ref() {
                let found = self
                    .peek()
                    .map_or_else(|| "end of input".to_owned(), ToString::to_string);
                return Err(ParseError::UnexpectedToken {
                    expected: "',' or closing bracket",
                    found,
                });
            }
        }
        if close.is_some() {
            self.pos += 1;
        }
        Ok((args, trailing))
    }

    fn arg(&mut self) -> Result<Arg, ParseError> {
        if let (Some(Token::Word(key)), Some(Token::Eq)) = (self.peek(), self.peek_at(1)) {
            let key = key.clone();
            self.pos += 2;
            let value = binary(&key, self.expr()?);
            return Ok(Arg::Keyword(key, value));
        }
        Ok(Arg::Positional(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let expr = self.repeat();
        self.depth -= 1;
        expr
    }

    fn repeat(&mut self) -> Result<Expr, ParseError> {
        let item = self.primary()?;
        if !self.eat(&Token::Star) {
            return Ok(item);
        }
        match self.next("repetition count")? {
            Token::Number { value, .. }
                if value >= 0. && value.fract() == 0. && value <= u32::MAX as f64 =>
            {
                Ok(Expr::Repeat {
                    item: Box::new(item),
                    times: value as usize,
                })
            }
            t => Err(ParseError::InvalidRepeat(t.to_string())),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.next("expression")? {
            Token::Number { text, value } => Ok(Expr::Number { text, value }),
            Token::Minus => match self.next("number")? {
                Token::Number { text, value } => Ok(Expr::Number {
                    text: match text.strip_prefix('-') {
                        Some(t) => t.to_owned(),
                        None => format!("-{text}"),
                    },
                    value: -value,
                }),
                t => Err(ParseError::UnexpectedToken {
                    expected: "number",
                    found: t.to_string(),
                }),
            },
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::LBracket => {
                let (args, _) = self.args(Some(Token::RBracket))?;
                Ok(Expr::List(positional(args)?))
            }
            Token::LParen => {
                let (args, trailing) = self.args(Some(Token::RParen))?;
                group(args, trailing)
            }
            Token::LBrace => Ok(Expr::Scope(self.scope()?)),
            Token::Word(name) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                match name.as_str() {
                    "dict" => {
                        let (args, _) = self.args(Some(Token::RParen))?;
                        keywords(args).map(Expr::Dict)
                    }
                    "Sequences" => {
                        self.expect(Token::Star, "'**'")?;
                        self.expect(Token::Star, "'**'")?;
                        self.expect(Token::LBrace, "'{'")?;
                        let entries = self.scope()?;
                        self.expect(Token::RParen, "')'")?;
                        if self.eat(&Token::LBracket) {
                            self.expect(Token::Colon, "':'")?;
                            self.expect(Token::RBracket, "']'")?;
                        }
                        Ok(Expr::Scope(entries))
                    }
                    _ => {
                        let (args, _) = self.args(Some(Token::RParen))?;
                        let mut positional = Vec::new();
                        let mut kwargs = Vec::new();
                        args.into_iter().for_each(|a| match a {
                            Arg::Positional(e) => positional.push(e),
                            Arg::Keyword(k, v) => kwargs.push((k, v)),
                        });
                        Ok(Expr::Call {
                            name,
                            args: positional,
                            kwargs,
                        })
                    }
                }
            }
            Token::Word(word) => Ok(Expr::Str(word)),
            t => Err(ParseError::UnexpectedToken {
                expected: "expression",
                found: t.to_string(),
            }),
        }
    }

    /// Parses the entries of a `{...}` scope after the opening brace.
    fn scope(&mut self) -> Result<Vec<(String, Expr)>, ParseError> {
        let mut entries = Vec::new();
        loop {
            let key = match self.next("'}'")? {
                Token::RBrace => break,
                Token::Word(k) | Token::Str(k) => k,
                t => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "key",
                        found: t.to_string(),
                    })
                }
            };
            self.expect(Token::Colon, "':'")?;
            let value = binary(&key, self.expr()?);
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace, "'}'")?;
                break;
            }
        }
        Ok(entries)
    }
}

fn positional(args: Vec<Arg>) -> Result<Vec<Expr>, ParseError> {
    args.into_iter()
        .map(|a| match a {
            Arg::Positional(e) => Ok(e),
            Arg::Keyword(k, _) => Err(ParseError::UnexpectedToken {
                expected: "value",
                found: format!("{k}="),
            }),
        })
        .collect()
}

fn keywords(args: Vec<Arg>) -> Result<Vec<(String, Expr)>, ParseError> {
    args.into_iter()
        .map(|a| match a {
            Arg::Keyword(k, v) => Ok((k, v)),
            Arg::Positional(e) => Err(ParseError::UnexpectedToken {
                expected: "key=value",
                found: e.to_string(),
            }),
        })
        .collect()
}

/// A parenthesized group: keyword arguments form a dict, a single value is itself, anything else a tuple.
fn group(args: Vec<Arg>, trailing: bool) -> Result<Expr, ParseError> {
    if !args.is_empty() && args.iter().all(|a| matches!(a, Arg::Keyword(..))) {
        return keywords(args).map(Expr::Dict);
    }
    let mut items = positional(args)?;
    if items.len() == 1 && !trailing {
        return Ok(items.remove(0));
    }
    Ok(Expr::Tuple(items))
}

/// Parses one line of the sequence language.
///
/// Keyword arguments at the top level form a dict; several positional arguments form a list.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
        depth: 0,
    };
    let (args, _) = parser.args(None)?;
    let keyword = args.iter().filter(|a| matches!(a, Arg::Keyword(..))).count();
    match (keyword, args.len()) {
        (0, 1) => Ok(positional(args)?.remove(0)),
        (0, _) => Ok(Expr::List(positional(args)?)),
        (k, n) if k == n => Ok(Expr::Dict(keywords(args)?)),
        _ => Err(ParseError::MixedTopLevel),
    }
}
