//! The sequence language.
//!
//! A line such as `interleave(-10us, log_series(1ms, 178ms))` or `{delay: [1ms, 2ms], PP: Flythru-4}`
//! is parsed once into an [`Expr`], which prints in a canonical form and is interpreted into scan point [`Record`]s.
//! Only the generators named in [`GENERATORS`] can be called.

mod ast;
mod generator;
mod interp;
mod lexer;
mod parser;

pub use ast::Expr;
pub use generator::{round_sig, GENERATORS};
pub use interp::{eval, records, Record, Scalar, Value};
pub use parser::parse;

use crate::error::ParseError;

/// Maximum nesting depth of an expression.
pub const MAX_DEPTH: usize = 64;

/// Maximum number of values an expression expands into.
pub const MAX_VALUES: usize = 1 << 20;

/// Prints a line of the sequence language in canonical form.
///
/// Canonicalizing a canonical line returns it unchanged.
pub fn canonicalize(input: &str) -> Result<String, ParseError> {
    Ok(parse(input)?.to_string())
}

/// Parses and interprets a line of the sequence language into scan point records.
pub fn try_parse_records(input: &str) -> Result<Vec<Record>, ParseError> {
    records(eval(&parse(input)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case("dict(S='101', PP='Flythru-4', delay=100e-12)")]
    #[case("Sequences(**{'delay': lin_series(0, 1e-3, steps=4), 'laser_on': [0, 1, 0, 1, 0]})[:]")]
    #[case("[dict(delay=1e-3)]*3")]
    #[case("pairs(-10e-6, power(1e-6, 1e-3, 4))")]
    #[test]
    fn canonical_is_fixed_point(#[case] canonical: &str) -> anyhow::Result<()> {
        assert_eq!(canonical, canonicalize(canonical)?);
        Ok(())
    }

    #[test]
    fn canonical_records_match() -> anyhow::Result<()> {
        let input = "{delay: [1ms, 2ms], S: 01, PP: Flythru-4}";
        assert_eq!(
            try_parse_records(input)?,
            try_parse_records(&canonicalize(input)?)?
        );
        Ok(())
    }
}
