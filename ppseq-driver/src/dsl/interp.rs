use std::fmt;

use indexmap::IndexMap;

use super::{ast::Expr, generator, MAX_VALUES};
use crate::error::ParseError;

/// A parameter value of a scan point.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    /// A number
    Num(f64),
    /// A string
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Num(x) => write!(f, "{:?}", x),
            Scalar::Str(s) => write!(f, "'{}'", s),
        }
    }
}

/// The parameters of one scan point in the order they were written.
pub type Record = IndexMap<String, Scalar>;

/// The value of an evaluated expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A number
    Num(f64),
    /// A string
    Str(String),
    /// A flat list
    List(Vec<Value>),
    /// Named parameters, possibly with list values
    Dict(Vec<(String, Value)>),
}

impl Value {
    /// The number of scan points or list items this value expands into.
    fn size(&self) -> usize {
        match self {
            Value::Num(_) | Value::Str(_) => 1,
            Value::List(items) => items
                .iter()
                .fold(0, |n: usize, v| n.saturating_add(v.size())),
            Value::Dict(entries) => entries
                .iter()
                .map(|(_, v)| match v {
                    Value::List(items) => items.len(),
                    _ => 1,
                })
                .max()
                .unwrap_or(1),
        }
    }
}

fn bounded(n: usize) -> Result<(), ParseError> {
    if n > MAX_VALUES {
        return Err(ParseError::TooManyValues(MAX_VALUES));
    }
    Ok(())
}

fn flatten(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    values
        .into_iter()
        .flat_map(|v| match v {
            Value::List(items) => items,
            v => vec![v],
        })
        .collect()
}

fn entries(entries: &[(String, Expr)]) -> Result<Vec<(String, Value)>, ParseError> {
    entries
        .iter()
        .map(|(k, v)| Ok((k.clone(), eval(v)?)))
        .collect()
}

/// Evaluates an expression. Nested lists are flattened.
pub fn eval(expr: &Expr) -> Result<Value, ParseError> {
    Ok(match expr {
        Expr::Number { value, .. } => Value::Num(*value),
        Expr::Str(s) => Value::Str(s.clone()),
        Expr::List(items) | Expr::Tuple(items) => {
            let items = items.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
            bounded(
                items
                    .iter()
                    .fold(0, |n: usize, v| n.saturating_add(v.size())),
            )?;
            Value::List(flatten(items))
        }
        Expr::Dict(e) | Expr::Scope(e) => Value::Dict(entries(e)?),
        Expr::Call { name, args, kwargs } => {
            let args = args.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
            let kwargs = entries(kwargs)?;
            Value::List(
                generator::call(name, args, kwargs)?
                    .into_iter()
                    .map(Value::Num)
                    .collect(),
            )
        }
        Expr::Repeat { item, times } => {
            let items = match eval(item)? {
                Value::List(items) => items,
                v => vec![v],
            };
            bounded(
                items
                    .iter()
                    .fold(0, |n: usize, v| n.saturating_add(v.size()))
                    .saturating_mul(*times),
            )?;
            Value::List(
                std::iter::repeat(items)
                    .take(*times)
                    .flatten()
                    .collect(),
            )
        }
    })
}

fn scalar(key: &str, value: Value) -> Result<Scalar, ParseError> {
    match value {
        Value::Num(x) => Ok(Scalar::Num(x)),
        Value::Str(s) => Ok(Scalar::Str(s)),
        v => Err(ParseError::InvalidValue {
            key: key.to_owned(),
            value: format!("{v:?}"),
        }),
    }
}

/// Expands named parameters into scan points. Lists are zipped and single values are repeated.
fn broadcast(entries: Vec<(String, Value)>) -> Result<Vec<Record>, ParseError> {
    let n = entries
        .iter()
        .filter_map(|(_, v)| match v {
            Value::List(items) if items.len() != 1 => Some(items.len()),
            _ => None,
        })
        .max()
        .unwrap_or(1);
    let columns = entries
        .into_iter()
        .map(|(key, value)| {
            let column = match value {
                Value::List(items) if items.len() == 1 || items.len() == n => items
                    .into_iter()
                    .map(|v| scalar(&key, v))
                    .collect::<Result<Vec<_>, _>>()?,
                Value::List(items) => {
                    return Err(ParseError::LengthMismatch {
                        key,
                        len: items.len(),
                        expected: n,
                    })
                }
                v => vec![scalar(&key, v)?],
            };
            Ok((key, column))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((0..n)
        .map(|i| {
            columns
                .iter()
                .map(|(key, column)| {
                    let v = if column.len() == 1 { &column[0] } else { &column[i] };
                    (key.clone(), v.clone())
                })
                .collect()
        })
        .collect())
}

/// Converts a value into scan points.
///
/// A bare number `x` is the scan point `delay=x, laser_on=1`.
pub fn records(value: Value) -> Result<Vec<Record>, ParseError> {
    match value {
        Value::Num(x) => Ok(vec![Record::from_iter([
            ("delay".to_owned(), Scalar::Num(x)),
            ("laser_on".to_owned(), Scalar::Num(1.)),
        ])]),
        Value::Str(s) => Err(ParseError::InvalidRecord(format!("'{s}'"))),
        Value::List(items) => Ok(items
            .into_iter()
            .map(records)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect()),
        Value::Dict(entries) => broadcast(entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;

    fn eval_records(input: &str) -> Result<Vec<Record>, ParseError> {
        records(eval(&parse(input)?)?)
    }

    fn delays(records: &[Record]) -> Vec<f64> {
        records
            .iter()
            .map(|r| match r.get("delay") {
                Some(Scalar::Num(x)) => *x,
                _ => f64::NAN,
            })
            .collect()
    }

    #[test]
    fn bare_numbers() -> anyhow::Result<()> {
        let records = eval_records("-10us, 1ms")?;
        assert_eq!(vec![-10e-6, 1e-3], delays(&records));
        assert!(records
            .iter()
            .all(|r| r.get("laser_on") == Some(&Scalar::Num(1.))));
        Ok(())
    }

    #[test]
    fn broadcast_scope() -> anyhow::Result<()> {
        let records = eval_records("{delay: [1ms, 2ms, 3ms], laser_on: 1, S: 101, mode: [Flythru-4]}")?;
        assert_eq!(3, records.len());
        assert_eq!(vec![1e-3, 2e-3, 3e-3], delays(&records));
        assert!(records.iter().all(|r| r.get("S") == Some(&Scalar::Str("101".to_owned()))
            && r.get("mode") == Some(&Scalar::Str("Flythru-4".to_owned()))));
        Ok(())
    }

    #[test]
    fn repeat_and_flatten() -> anyhow::Result<()> {
        let records = eval_records("[(delay=1ms), [2ms, [3ms]]]*2, (4ms)*2")?;
        assert_eq!(vec![1e-3, 2e-3, 3e-3, 1e-3, 2e-3, 3e-3, 4e-3, 4e-3], delays(&records));
        Ok(())
    }

    #[test]
    fn generators() -> anyhow::Result<()> {
        let records = eval_records("interleave(-10us, log_series(1ms, 178ms, steps_per_decade=4))")?;
        assert_eq!(21, records.len());
        assert!(delays(&records).iter().step_by(2).all(|d| *d == -10e-6));
        assert_eq!(1.78e-1, delays(&records)[19]);
        Ok(())
    }

    #[rstest::rstest]
    #[case(ParseError::LengthMismatch { key: "laser_on".to_owned(), len: 2, expected: 3 }, "delay=[1,2,3], laser_on=[0,1]")]
    #[case(ParseError::InvalidRecord("'abc'".to_owned()), "abc")]
    #[case(ParseError::InvalidValue { key: "delay".to_owned(), value: "Dict([(\"x\", Num(1.0))])".to_owned() }, "delay=[dict(x=1)]")]
    #[case(ParseError::TooManyValues(MAX_VALUES), "[1ms]*4294967295")]
    #[case(ParseError::TooManyValues(MAX_VALUES), "[dict(delay=lin_series(0, 1, steps=1000))]*2000")]
    #[case(ParseError::TooManyValues(MAX_VALUES), "[[1ms]*600000, [2ms]*600000]")]
    #[test]
    fn errors(#[case] expect: ParseError, #[case] input: &str) {
        assert_eq!(Err(expect), eval_records(input));
    }

    #[test]
    fn empty_list_yields_no_records() -> anyhow::Result<()> {
        assert!(eval_records("delay=[], laser_on=1")?.is_empty());
        Ok(())
    }
}
