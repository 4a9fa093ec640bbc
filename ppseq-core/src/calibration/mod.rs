use std::{
    collections::{BTreeMap, HashMap, HashSet},
    str::FromStr,
    sync::{Mutex, PoisonError},
};

use crate::defined::{ns, us};

/// A source of persistent device parameters.
pub trait ParameterSource {
    /// The value of `key`, or `None` if it is not set.
    fn parameter(&self, key: &str) -> Option<String>;
}

impl ParameterSource for BTreeMap<String, String> {
    fn parameter(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl ParameterSource for HashMap<String, String> {
    fn parameter(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Timing calibration of a device.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    /// Bunch clock tick \[s\]
    pub bct: f64,
    /// Bunch clock ticks per quarter of a high-speed chopper tick
    pub clk_div: u32,
    /// Delay of the X-ray pulse relative to its tick \[s\]
    pub xd: f64,
    /// Phase of the high-speed chopper \[s\]
    pub chopper_phase: f64,
    /// Step of the fine picosecond oscillator delay \[s\]
    pub psod2_step: f64,
    /// Wrap of the interrupt counter. Opaque positive integer.
    pub phase_matching_period: u32,
}

impl Default for Calibration {
    fn default() -> Self {
        let bct = 1. / 351.933_98e6;
        Self {
            bct,
            clk_div: 89100,
            xd: 0.,
            chopper_phase: 0.,
            psod2_step: bct / 256.,
            phase_matching_period: 1,
        }
    }
}

impl Calibration {
    /// Parameter keys of the calibration constants.
    pub const KEYS: [&'static str; 6] = [
        "bct",
        "clk_88Hz_div_1kHz",
        "xd",
        "chopper_phase",
        "psod2_step",
        "phase_matching_period",
    ];

    /// High-speed chopper tick \[s\], the duration of one tick of a packet.
    #[must_use]
    pub fn hsct(&self) -> f64 {
        4. * self.bct * self.clk_div as f64
    }

    /// X-ray delay including the chopper phase, which only applies between 100 ns and 4 us.
    #[must_use]
    pub fn effective_xd(&self) -> f64 {
        let phase = self.chopper_phase.abs();
        if 100. * ns < phase && phase < 4. * us {
            self.xd + self.chopper_phase
        } else {
            self.xd
        }
    }

    /// The calibration constants as parameter key-value pairs.
    #[must_use]
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            (Self::KEYS[0], format!("{:?}", self.bct)),
            (Self::KEYS[1], self.clk_div.to_string()),
            (Self::KEYS[2], format!("{:?}", self.xd)),
            (Self::KEYS[3], format!("{:?}", self.chopper_phase)),
            (Self::KEYS[4], format!("{:?}", self.psod2_step)),
            (Self::KEYS[5], self.phase_matching_period.to_string()),
        ]
    }

    /// The canonical description, used in packet descriptors.
    #[must_use]
    pub fn description(&self) -> String {
        self.parameters()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Reads a [`Calibration`] from device parameters, substituting defaults for missing keys.
///
/// Each missing or invalid key is reported once per loader.
#[derive(Debug, Default)]
pub struct CalibrationLoader {
    warned: Mutex<HashSet<String>>,
}

impl CalibrationLoader {
    /// Creates a new [`CalibrationLoader`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn warn_once(&self, key: &str, reason: &str) {
        let mut warned = self.warned.lock().unwrap_or_else(PoisonError::into_inner);
        if warned.insert(key.to_owned()) {
            tracing::warn!("Calibration parameter {} {}, using the default", key, reason);
        }
    }

    fn read<T: FromStr>(&self, source: &impl ParameterSource, key: &str, default: T) -> T {
        match source.parameter(key) {
            Some(text) => text.trim().parse().unwrap_or_else(|_| {
                self.warn_once(key, "is invalid");
                default
            }),
            None => {
                self.warn_once(key, "is missing");
                default
            }
        }
    }

    /// Loads the calibration.
    pub fn load(&self, source: &impl ParameterSource) -> Calibration {
        let default = Calibration::default();
        let [bct, clk_div, xd, chopper_phase, psod2_step, pmp] = Calibration::KEYS;
        let mut phase_matching_period = self.read(source, pmp, default.phase_matching_period);
        if phase_matching_period == 0 {
            self.warn_once(pmp, "is zero");
            phase_matching_period = default.phase_matching_period;
        }
        Calibration {
            bct: self.read(source, bct, default.bct),
            clk_div: self.read(source, clk_div, default.clk_div),
            xd: self.read(source, xd, default.xd),
            chopper_phase: self.read(source, chopper_phase, default.chopper_phase),
            psod2_step: self.read(source, psod2_step, default.psod2_step),
            phase_matching_period,
        }
    }

    /// Keys reported as missing or invalid so far.
    #[must_use]
    pub fn warned(&self) -> Vec<String> {
        let mut keys = self
            .warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsct_is_about_one_millisecond() {
        let cal = Calibration::default();
        approx::assert_abs_diff_eq!(1e-3, cal.hsct(), epsilon = 2e-5);
        approx::assert_abs_diff_eq!(2.8414e-9, cal.bct, epsilon = 1e-13);
    }

    #[rstest::rstest]
    #[case(1e-6, 0.)]
    #[case(1e-6, 50e-9)]
    #[case(1e-6 + 200e-9, 200e-9)]
    #[case(1e-6 - 3e-6, -3e-6)]
    #[case(1e-6, 4e-6)]
    #[case(1e-6, -5e-6)]
    #[test]
    fn effective_xd(#[case] expect: f64, #[case] phase: f64) {
        let cal = Calibration {
            xd: 1e-6,
            chopper_phase: phase,
            ..Default::default()
        };
        approx::assert_abs_diff_eq!(expect, cal.effective_xd());
    }

    #[test]
    fn load_and_description() {
        let source = Calibration {
            xd: 2.5e-6,
            phase_matching_period: 4,
            ..Default::default()
        }
        .parameters()
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect::<BTreeMap<_, _>>();

        let loader = CalibrationLoader::new();
        let cal = loader.load(&source);
        assert_eq!(2.5e-6, cal.xd);
        assert_eq!(4, cal.phase_matching_period);
        assert!(loader.warned().is_empty());
        assert!(cal
            .description()
            .starts_with("bct=2.8414"));
        assert!(cal.description().ends_with(",phase_matching_period=4"));
    }

    #[test]
    fn missing_keys_are_warned_once() {
        let mut source = BTreeMap::new();
        source.insert("xd".to_owned(), "abc".to_owned());
        source.insert("phase_matching_period".to_owned(), "0".to_owned());

        let loader = CalibrationLoader::new();
        let cal = loader.load(&source);
        assert_eq!(Calibration::default(), cal);
        let warned = loader.warned();
        assert_eq!(6, warned.len());

        let _ = loader.load(&source);
        assert_eq!(warned, loader.warned());
    }
}
