use std::fmt;

use itertools::Itertools;

/// An expression of the sequence language.
///
/// The [`Display`](fmt::Display) implementation prints the canonical form, which parses back into the same expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A number with its canonical text.
    Number {
        /// Canonical text, with time units expanded into exponents.
        text: String,
        /// The value.
        value: f64,
    },
    /// A string, bare word or binary pattern.
    Str(String),
    /// `[a, b, ...]`
    List(Vec<Expr>),
    /// `(a, b, ...)`
    Tuple(Vec<Expr>),
    /// `dict(key=value, ...)`
    Dict(Vec<(String, Expr)>),
    /// `Sequences(**{'key': value, ...})[:]`
    Scope(Vec<(String, Expr)>),
    /// A call to a generator.
    Call {
        /// Generator name
        name: String,
        /// Positional arguments
        args: Vec<Expr>,
        /// Keyword arguments
        kwargs: Vec<(String, Expr)>,
    },
    /// `[a, ...]*times`
    Repeat {
        /// Repeated expression
        item: Box<Expr>,
        /// Number of repetitions
        times: usize,
    },
}

fn quote(s: &str) -> String {
    if s.contains('\'') {
        format!("\"{s}\"")
    } else {
        format!("'{s}'")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number { text, .. } => write!(f, "{}", text),
            Expr::Str(s) => write!(f, "{}", quote(s)),
            Expr::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Expr::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Expr::Tuple(items) => write!(f, "({})", items.iter().join(", ")),
            Expr::Dict(entries) => write!(
                f,
                "dict({})",
                entries.iter().map(|(k, v)| format!("{k}={v}")).join(", ")
            ),
            Expr::Scope(entries) => write!(
                f,
                "Sequences(**{{{}}})[:]",
                entries
                    .iter()
                    .map(|(k, v)| format!("{}: {v}", quote(k)))
                    .join(", ")
            ),
            Expr::Call { name, args, kwargs } => write!(
                f,
                "{}({})",
                name,
                args.iter()
                    .map(ToString::to_string)
                    .chain(kwargs.iter().map(|(k, v)| format!("{k}={v}")))
                    .join(", ")
            ),
            Expr::Repeat { item, times } => match item.as_ref() {
                Expr::List(_) => write!(f, "{}*{}", item, times),
                _ => write!(f, "[{}]*{}", item, times),
            },
        }
    }
}
