use std::collections::BTreeMap;

use ppseq_core::defined::{DELAY_MAX, DELAY_MIN, NOMINAL_DELAY_THRESHOLD, TICK_PERIOD};

use super::alias::{canonical_name, Mode, BIT_FIELDS, BIT_KEYS, MODES};
use crate::{
    dsl::{round_sig, Record, Scalar},
    error::ParseError,
};

/// The normalized parameters of one scan point.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceParameters {
    /// Pump-probe delay \[s\]. Positive when the pump precedes the probe.
    pub delay: f64,
    /// Nominal delay \[s\] when `delay` was given as an integer number of ticks.
    pub nom_delay: Option<f64>,
    /// Pump laser fires.
    pub laser_on: bool,
    /// Millisecond X-ray shutter opens.
    pub ms_on: bool,
    /// X-ray detector is triggered.
    pub xdet_on: bool,
    /// Sample pump circulates.
    pub pump_on: bool,
    /// Sample is dumped.
    pub dump_on: bool,
    /// The scan point belongs to a dataset being acquired.
    pub acquiring: bool,
    /// The scan point produces an image.
    pub acquire: bool,
    /// The FPGA mode.
    pub mode: &'static Mode,
    /// Ticks per scan point.
    pub period: usize,
    /// X-ray pulses per scan point.
    pub n: usize,
    /// Ticks between X-ray pulses.
    pub dt: usize,
    /// Tick of the first X-ray pulse.
    pub t0: usize,
    /// Ticks per slot of the sample translation code.
    pub transd: usize,
    /// Sample translation code. Derived from the following scan point if not given.
    pub transc: Option<u32>,
    /// Sample translation is requested.
    pub z: bool,
    /// Increment `image_number` at the end of the scan point. Defaults to `acquiring && acquire`.
    pub image_number_inc: Option<bool>,
    /// Increment `pass_number` at the start of the scan point.
    pub pass_number_inc: bool,
    /// Value written to `pass_number` at the start of the scan point.
    pub pass_number: Option<u64>,
    /// Parameters without a meaning to the compiler, kept for the descriptor.
    pub extra: BTreeMap<String, Scalar>,
}

impl Default for SequenceParameters {
    fn default() -> Self {
        let mode = &MODES[0];
        Self {
            delay: 0.,
            nom_delay: None,
            laser_on: false,
            ms_on: true,
            xdet_on: true,
            pump_on: false,
            dump_on: false,
            acquiring: false,
            acquire: true,
            mode,
            period: mode.period,
            n: mode.n,
            dt: mode.dt,
            t0: mode.t0,
            transd: mode.transd,
            transc: None,
            z: false,
            image_number_inc: None,
            pass_number_inc: false,
            pass_number: None,
            extra: BTreeMap::new(),
        }
    }
}

fn invalid(key: &str, value: &Scalar) -> ParseError {
    ParseError::InvalidValue {
        key: key.to_owned(),
        value: value.to_string(),
    }
}

fn flag(key: &str, value: &Scalar) -> Result<bool, ParseError> {
    match value {
        Scalar::Num(x) if x.is_nan() => Ok(false),
        Scalar::Num(x) => Ok(*x != 0.),
        Scalar::Str(s) => match s.as_str() {
            "1" | "True" | "true" => Ok(true),
            "0" | "False" | "false" | "" => Ok(false),
            _ => Err(invalid(key, value)),
        },
    }
}

fn number(key: &str, value: &Scalar) -> Result<f64, ParseError> {
    match value {
        Scalar::Num(x) => Ok(*x),
        Scalar::Str(s) => s.trim().parse().map_err(|_| invalid(key, value)),
    }
}

fn integer(key: &str, value: &Scalar) -> Result<u64, ParseError> {
    match number(key, value)? {
        x if x >= 0. && x.fract() == 0. && x < u64::MAX as f64 => Ok(x as u64),
        _ => Err(invalid(key, value)),
    }
}

fn mode(key: &str, value: &Scalar) -> Result<&'static Mode, ParseError> {
    let mode = match value {
        Scalar::Str(s) => Mode::by_name(s).or_else(|| s.parse().ok().and_then(Mode::by_number)),
        Scalar::Num(x) if x.fract() == 0. && *x >= 0. => Mode::by_number(*x as u32),
        Scalar::Num(_) => None,
    };
    mode.ok_or_else(|| invalid(key, value))
}

impl SequenceParameters {
    /// Normalizes a scan point record.
    ///
    /// Aliases resolve to canonical names and the mode sets its timing defaults,
    /// which explicit timing parameters override. A NaN delay skips the image;
    /// an integer delay of 48 or more also records a nominal delay in ticks,
    /// which is only logged and leaves `delay` unchanged.
    pub fn from_record(record: &Record) -> Result<Self, ParseError> {
        let is_mode = |key: &str| matches!(canonical_name(key), "mode" | "mode_number");
        let mut params = Self::default();
        if let Some((key, value)) = record.iter().rev().find(|(k, _)| is_mode(k.as_str())) {
            params.set_mode(mode(key, value)?);
        }
        record
            .iter()
            .filter(|(k, _)| !is_mode(k.as_str()))
            .try_for_each(|(key, value)| params.set(key, value))?;

        if params.delay.is_nan() {
            params.acquire = false;
        } else if params.delay >= NOMINAL_DELAY_THRESHOLD && params.delay.fract() == 0. {
            let nom_delay = round_sig(params.delay * TICK_PERIOD, 12);
            tracing::debug!(
                "delay {} is a nominal delay of {} s",
                params.delay,
                nom_delay
            );
            params.nom_delay = Some(nom_delay);
        }
        params.validate()?;
        Ok(params)
    }

    fn set_mode(&mut self, mode: &'static Mode) {
        self.mode = mode;
        self.period = mode.period;
        self.n = mode.n;
        self.dt = mode.dt;
        self.t0 = mode.t0;
        self.transd = mode.transd;
    }

    fn set(&mut self, key: &str, value: &Scalar) -> Result<(), ParseError> {
        if BIT_KEYS.contains(&key) {
            let bits = match value {
                Scalar::Str(s) => s.clone(),
                Scalar::Num(x) => format!("{x}"),
            };
            if bits.len() > BIT_FIELDS.len() || !bits.chars().all(|c| c == '0' || c == '1') {
                return Err(invalid(key, value));
            }
            bits.chars()
                .zip(BIT_FIELDS)
                .try_for_each(|(c, field)| self.set(field, &Scalar::Num(if c == '1' { 1. } else { 0. })))?;
            return Ok(());
        }
        let name = canonical_name(key);
        match name {
            "delay" => self.delay = number(key, value)?,
            "nom_delay" => self.nom_delay = Some(number(key, value)?),
            "laser_on" => self.laser_on = flag(key, value)?,
            "ms_on" => self.ms_on = flag(key, value)?,
            "xdet_on" => self.xdet_on = flag(key, value)?,
            "pump_on" => self.pump_on = flag(key, value)?,
            "dump_on" => self.dump_on = flag(key, value)?,
            "acquiring" => self.acquiring = flag(key, value)?,
            "acquire" => self.acquire = flag(key, value)?,
            "period" => self.period = integer(key, value)? as usize,
            "N" => self.n = integer(key, value)? as usize,
            "dt" => self.dt = integer(key, value)? as usize,
            "t0" => self.t0 = integer(key, value)? as usize,
            "transd" => self.transd = integer(key, value)? as usize,
            "transc" => {
                self.transc = Some(
                    u32::try_from(integer(key, value)?).map_err(|_| invalid(key, value))?,
                )
            }
            "z" => self.z = flag(key, value)?,
            "image_number_inc" => self.image_number_inc = Some(flag(key, value)?),
            "pass_number_inc" => self.pass_number_inc = flag(key, value)?,
            "pass_number" => self.pass_number = Some(integer(key, value)?),
            _ => {
                tracing::debug!("Unknown sequence parameter {} kept as is", key);
                self.extra.insert(key.to_owned(), value.clone());
            }
        }
        Ok(())
    }

    /// Checks the timing of the scan point.
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.period == 0 {
            return Err(ParseError::InvalidTiming("period must be positive".to_owned()));
        }
        if self.n * self.dt > self.period {
            return Err(ParseError::InvalidTiming(format!(
                "N*dt = {}*{} exceeds the period of {} ticks",
                self.n, self.dt, self.period
            )));
        }
        Ok(())
    }

    /// The delay used for compilation, limited to the delay window. A NaN delay is zero.
    #[must_use]
    pub fn physical_delay(&self) -> f64 {
        if self.delay.is_nan() {
            return 0.;
        }
        if !(DELAY_MIN..=DELAY_MAX).contains(&self.delay) {
            let clamped = self.delay.clamp(DELAY_MIN, DELAY_MAX);
            tracing::warn!(
                "delay {} s is outside of [{}, {}] s, using {} s",
                self.delay,
                DELAY_MIN,
                DELAY_MAX,
                clamped
            );
            return clamped;
        }
        self.delay
    }

    /// Whether `image_number` is incremented at the end of the scan point.
    #[must_use]
    pub fn increments_image_number(&self) -> bool {
        self.image_number_inc
            .unwrap_or(self.acquiring && self.acquire)
    }

    /// The canonical text of all parameters in a fixed order.
    #[must_use]
    pub fn description(&self) -> String {
        fn b(v: bool) -> u8 {
            v as u8
        }
        fn opt<T: std::fmt::Debug>(v: Option<T>) -> String {
            v.map_or_else(|| "None".to_owned(), |v| format!("{v:?}"))
        }
        let mut text = format!(
            "delay={:?},nom_delay={},laser_on={},ms_on={},xdet_on={},pump_on={},dump_on={},acquiring={},acquire={},\
             period={},N={},dt={},t0={},mode='{}',mode_number={},transd={},transc={},z={},\
             image_number_inc={},pass_number_inc={},pass_number={}",
            self.delay,
            opt(self.nom_delay),
            b(self.laser_on),
            b(self.ms_on),
            b(self.xdet_on),
            b(self.pump_on),
            b(self.dump_on),
            b(self.acquiring),
            b(self.acquire),
            self.period,
            self.n,
            self.dt,
            self.t0,
            self.mode.name,
            self.mode.number,
            self.transd,
            opt(self.transc),
            b(self.z),
            opt(self.image_number_inc.map(b)),
            b(self.pass_number_inc),
            opt(self.pass_number),
        );
        self.extra
            .iter()
            .for_each(|(k, v)| text.push_str(&format!(",{k}={v}")));
        text
    }
}
