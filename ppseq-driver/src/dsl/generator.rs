use super::{interp::Value, MAX_VALUES};
use crate::error::ParseError;

/// Names of the generator functions.
pub const GENERATORS: [&str; 6] = [
    "lin_series",
    "log_series",
    "power",
    "ramp",
    "pairs",
    "interleave",
];

/// Rounds `x` to `digits` significant digits.
#[must_use]
pub fn round_sig(x: f64, digits: usize) -> f64 {
    if !x.is_finite() || x == 0. {
        return x;
    }
    format!("{:.*e}", digits.saturating_sub(1), x)
        .parse()
        .unwrap_or(x)
}

/// Removes floating point noise from arithmetic series.
fn clean(x: f64) -> f64 {
    round_sig(x, 12)
}

struct Params<'a> {
    function: &'a str,
    values: Vec<Option<Value>>,
}

impl<'a> Params<'a> {
    fn bind(
        function: &'a str,
        names: &[&str],
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Self, ParseError> {
        let err = |reason: String| ParseError::InvalidArgument {
            function: function.to_owned(),
            reason,
        };
        if args.len() > names.len() {
            return Err(err(format!(
                "takes at most {} arguments, {} given",
                names.len(),
                args.len()
            )));
        }
        let mut values = vec![None; names.len()];
        args.into_iter()
            .enumerate()
            .for_each(|(i, v)| values[i] = Some(v));
        for (key, v) in kwargs {
            let i = names
                .iter()
                .position(|n| *n == key)
                .ok_or_else(|| err(format!("unexpected argument {key}")))?;
            if values[i].is_some() {
                return Err(err(format!("{key} given twice")));
            }
            values[i] = Some(v);
        }
        Ok(Self { function, values })
    }

    fn err(&self, reason: impl Into<String>) -> ParseError {
        ParseError::InvalidArgument {
            function: self.function.to_owned(),
            reason: reason.into(),
        }
    }

    fn opt_num(&self, i: usize) -> Result<Option<f64>, ParseError> {
        match &self.values[i] {
            None => Ok(None),
            Some(Value::Num(x)) => Ok(Some(*x)),
            Some(Value::List(v)) if v.len() == 1 => match v[0] {
                Value::Num(x) => Ok(Some(x)),
                _ => Err(self.err("expected a number")),
            },
            Some(_) => Err(self.err("expected a number")),
        }
    }

    fn num(&self, i: usize, name: &str) -> Result<f64, ParseError> {
        self.opt_num(i)?
            .ok_or_else(|| self.err(format!("missing argument {name}")))
    }

    fn count(&self, i: usize, name: &str) -> Result<Option<usize>, ParseError> {
        match self.opt_num(i)? {
            None => Ok(None),
            Some(x) if x >= 1. && x.fract() == 0. => Ok(Some(x as usize)),
            Some(x) => Err(self.err(format!("{name} must be a positive integer, got {x}"))),
        }
    }

    fn series(&self, i: usize, name: &str) -> Result<Vec<f64>, ParseError> {
        match &self.values[i] {
            None => Err(self.err(format!("missing argument {name}"))),
            Some(Value::Num(x)) => Ok(vec![*x]),
            Some(Value::List(v)) => v
                .iter()
                .map(|x| match x {
                    Value::Num(x) => Ok(*x),
                    _ => Err(self.err(format!("{name} must be a list of numbers"))),
                })
                .collect(),
            Some(_) => Err(self.err(format!("{name} must be a list of numbers"))),
        }
    }
}

/// Fails if a series of `n` values is longer than [`MAX_VALUES`].
fn limit(n: f64) -> Result<usize, ParseError> {
    if n.is_finite() && n <= MAX_VALUES as f64 {
        Ok(n as usize)
    } else {
        Err(ParseError::TooManyValues(MAX_VALUES))
    }
}

fn lin_series(p: &Params, start: f64, end: f64, step: Option<f64>, steps: Option<usize>) -> Result<Vec<f64>, ParseError> {
    match (step, steps) {
        (_, Some(n)) => {
            limit(n as f64 + 1.)?;
            Ok((0..=n)
                .map(|i| clean(start + (end - start) * i as f64 / n as f64))
                .collect())
        }
        (Some(step), None) => {
            if step == 0. || (end - start) * step < 0. {
                return Err(p.err(format!("step {step} does not lead from {start} to {end}")));
            }
            let n = limit(((end - start) / step + 1e-9).floor() + 1.)? - 1;
            Ok((0..=n).map(|i| clean(start + step * i as f64)).collect())
        }
        (None, None) => Err(p.err("either step or steps is required")),
    }
}

/// Evaluates a call to a generator.
pub(crate) fn call(
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Vec<f64>, ParseError> {
    match name {
        "lin_series" => {
            let p = Params::bind(name, &["start", "end", "step", "steps"], args, kwargs)?;
            lin_series(&p, p.num(0, "start")?, p.num(1, "end")?, p.opt_num(2)?, p.count(3, "steps")?)
        }
        "log_series" => {
            let p = Params::bind(name, &["start", "end", "steps_per_decade"], args, kwargs)?;
            let (start, end) = (p.num(0, "start")?, p.num(1, "end")?);
            let per_decade = p.count(2, "steps_per_decade")?.unwrap_or(4) as f64;
            if start <= 0. || end < start {
                return Err(p.err(format!("invalid range {start} to {end}")));
            }
            let first = (per_decade * start.log10()).floor() as i64 - 1;
            let last = (per_decade * end.log10()).ceil() as i64 + 1;
            limit((last - first) as f64)?;
            Ok((first..=last)
                .map(|k| round_sig(10f64.powf(k as f64 / per_decade), 3))
                .filter(|x| *x >= start * (1. - 1e-9) && *x <= end * (1. + 1e-9))
                .collect())
        }
        "power" => {
            let p = Params::bind(name, &["start", "end", "N"], args, kwargs)?;
            let (start, end) = (p.num(0, "start")?, p.num(1, "end")?);
            let n = p
                .count(2, "N")?
                .ok_or_else(|| p.err("missing argument N"))?;
            limit(n as f64)?;
            if start == 0. || end / start <= 0. {
                return Err(p.err(format!("{start} and {end} must be nonzero with the same sign")));
            }
            if n == 1 {
                return Ok(vec![start]);
            }
            Ok((0..n)
                .map(|i| clean(start * (end / start).powf(i as f64 / (n - 1) as f64)))
                .collect())
        }
        "ramp" => {
            let p = Params::bind(name, &["start", "end", "step"], args, kwargs)?;
            let up = lin_series(&p, p.num(0, "start")?, p.num(1, "end")?, Some(p.num(2, "step")?), None)?;
            let down = up.iter().rev().skip(1).copied().collect::<Vec<_>>();
            Ok(up.into_iter().chain(down).collect())
        }
        "pairs" | "interleave" => {
            let p = Params::bind(name, &["ref", "series"], args, kwargs)?;
            let reference = p.num(0, "ref")?;
            let mut values = p
                .series(1, "series")?
                .into_iter()
                .flat_map(|x| [reference, x])
                .collect::<Vec<_>>();
            if name == "interleave" {
                values.push(reference);
            }
            Ok(values)
        }
        _ => Err(ParseError::UnknownFunction(name.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn nums(xs: &[f64]) -> Vec<Value> {
        xs.iter().map(|x| Value::Num(*x)).collect()
    }

    fn kw(key: &str, x: f64) -> (String, Value) {
        (key.to_owned(), Value::Num(x))
    }

    #[rstest::rstest]
    #[case(1.78e-3, 1.7782794e-3)]
    #[case(3.16e-2, 3.1622777e-2)]
    #[case(-5.62, -5.6234)]
    #[case(0., 0.)]
    #[test]
    fn round_sig_3(#[case] expect: f64, #[case] x: f64) {
        assert_eq!(expect, round_sig(x, 3));
    }

    #[test]
    fn log_series() -> anyhow::Result<()> {
        assert_eq!(
            vec![1e-3, 1.78e-3, 3.16e-3, 5.62e-3, 1e-2, 1.78e-2, 3.16e-2, 5.62e-2, 1e-1, 1.78e-1],
            call("log_series", nums(&[1e-3, 178e-3]), vec![kw("steps_per_decade", 4.)])?
        );
        assert_eq!(
            vec![1e-6, 1e-5, 1e-4],
            call("log_series", nums(&[1e-6, 1e-4, 1.]), vec![])?
        );
        Ok(())
    }

    #[rstest::rstest]
    #[case(vec![0., 0.25, 0.5, 0.75, 1.], vec![0., 1.], vec![kw("steps", 4.)])]
    #[case(vec![0., 0.1, 0.2, 0.3], vec![0., 0.3, 0.1], vec![])]
    #[case(vec![1., 0.5, 0.], vec![1., 0., -0.5], vec![])]
    #[case(vec![1e-3, 1.5e-3], vec![1e-3, 1.6e-3], vec![kw("step", 0.5e-3)])]
    #[test]
    fn lin(#[case] expect: Vec<f64>, #[case] args: Vec<f64>, #[case] kwargs: Vec<(String, Value)>) -> anyhow::Result<()> {
        assert_eq!(expect, call("lin_series", nums(&args), kwargs)?);
        Ok(())
    }

    #[test]
    fn others() -> anyhow::Result<()> {
        assert_eq!(vec![1., 10., 100.], call("power", nums(&[1., 100., 3.]), vec![])?);
        assert_eq!(vec![0., 1., 2., 1., 0.], call("ramp", nums(&[0., 2., 1.]), vec![])?);
        let series = vec![Value::Num(-1.), Value::List(nums(&[1., 2.]))];
        assert_eq!(vec![-1., 1., -1., 2.], call("pairs", series.clone(), vec![])?);
        assert_eq!(vec![-1., 1., -1., 2., -1.], call("interleave", series, vec![])?);
        Ok(())
    }

    #[test]
    fn power_is_geometric() -> anyhow::Result<()> {
        let values = call("power", nums(&[1e-3, 8e-3, 4.]), vec![])?;
        assert_eq!(4, values.len());
        [1e-3, 2e-3, 4e-3, 8e-3]
            .iter()
            .zip(values)
            .for_each(|(expect, x)| assert_abs_diff_eq!(*expect, x, epsilon = 1e-12));
        Ok(())
    }

    #[rstest::rstest]
    #[case(ParseError::TooManyValues(MAX_VALUES), "lin_series", nums(&[0., 1.]), vec![kw("steps", 1e12)])]
    #[case(ParseError::TooManyValues(MAX_VALUES), "lin_series", nums(&[0., 1., 1e-12]), vec![])]
    #[case(ParseError::TooManyValues(MAX_VALUES), "ramp", nums(&[0., 1., 1e-12]), vec![])]
    #[case(ParseError::TooManyValues(MAX_VALUES), "power", nums(&[1., 2., 1e9]), vec![])]
    #[case(ParseError::TooManyValues(MAX_VALUES), "log_series", nums(&[1e-300, 1e300, 1e4]), vec![])]
    #[case(ParseError::UnknownFunction("range".to_owned()), "range", nums(&[1.]), vec![])]
    #[case(ParseError::InvalidArgument { function: "lin_series".to_owned(), reason: "either step or steps is required".to_owned() }, "lin_series", nums(&[0., 1.]), vec![])]
    #[case(ParseError::InvalidArgument { function: "lin_series".to_owned(), reason: "step -1 does not lead from 0 to 1".to_owned() }, "lin_series", nums(&[0., 1., -1.]), vec![])]
    #[case(ParseError::InvalidArgument { function: "power".to_owned(), reason: "unexpected argument M".to_owned() }, "power", nums(&[1., 2.]), vec![kw("M", 2.)])]
    #[case(ParseError::InvalidArgument { function: "log_series".to_owned(), reason: "steps_per_decade must be a positive integer, got 0.5".to_owned() }, "log_series", nums(&[1., 2., 0.5]), vec![])]
    #[test]
    fn errors(
        #[case] expect: ParseError,
        #[case] name: &str,
        #[case] args: Vec<Value>,
        #[case] kwargs: Vec<(String, Value)>,
    ) {
        assert_eq!(Err(expect), call(name, args, kwargs));
    }
}
