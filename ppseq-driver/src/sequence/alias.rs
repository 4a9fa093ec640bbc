/// A scripted timing mode of the FPGA.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mode {
    /// Name used in the sequence language, e.g. `Flythru-4`
    pub name: &'static str,
    /// Mode number, part of the sample translation code
    pub number: u32,
    /// Ticks per scan point
    pub period: usize,
    /// X-ray pulses per scan point
    pub n: usize,
    /// Ticks between X-ray pulses
    pub dt: usize,
    /// Tick of the first X-ray pulse
    pub t0: usize,
    /// Ticks per slot of the sample translation code
    pub transd: usize,
}

/// The modes known to the sequencer.
pub static MODES: [Mode; 4] = [
    Mode {
        name: "Default",
        number: 0,
        period: 48,
        n: 1,
        dt: 1,
        t0: 24,
        transd: 1,
    },
    Mode {
        name: "Flythru-4",
        number: 1,
        period: 48,
        n: 4,
        dt: 12,
        t0: 4,
        transd: 1,
    },
    Mode {
        name: "Flythru-48",
        number: 2,
        period: 264,
        n: 48,
        dt: 4,
        t0: 24,
        transd: 2,
    },
    Mode {
        name: "Stepping-12",
        number: 3,
        period: 264,
        n: 12,
        dt: 12,
        t0: 48,
        transd: 2,
    },
];

impl Mode {
    /// Looks up a mode by name, ignoring case.
    #[must_use]
    pub fn by_name(name: &str) -> Option<&'static Mode> {
        MODES.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Looks up a mode by number.
    #[must_use]
    pub fn by_number(number: u32) -> Option<&'static Mode> {
        MODES.iter().find(|m| m.number == number)
    }
}

/// Keys whose value is a string of `0`/`1` that sets [`BIT_FIELDS`], most significant first.
pub const BIT_KEYS: [&str; 3] = ["S", "SEQ", "enable"];

/// The flags set by a bit pattern, in pattern order.
pub const BIT_FIELDS: [&str; 5] = ["xdet_on", "laser_on", "ms_on", "pump_on", "dump_on"];

/// Alternative names of sequence parameters.
pub const ALIASES: [(&str, &str); 12] = [
    ("PLP", "mode"),
    ("PP", "mode"),
    ("pp", "mode"),
    ("circulate", "pump_on"),
    ("acq", "acquire"),
    ("image", "acquire"),
    ("laser", "laser_on"),
    ("pump", "laser_on"),
    ("probe", "ms_on"),
    ("xray", "ms_on"),
    ("xray_on", "ms_on"),
    ("xdet", "xdet_on"),
];

/// The canonical name of a parameter.
#[must_use]
pub fn canonical_name(key: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map_or(key, |(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case("mode", "PP")]
    #[case("mode", "PLP")]
    #[case("pump_on", "circulate")]
    #[case("laser_on", "pump")]
    #[case("ms_on", "xray")]
    #[case("acquire", "image")]
    #[case("delay", "delay")]
    #[case("foo", "foo")]
    #[test]
    fn aliases(#[case] expect: &str, #[case] key: &str) {
        assert_eq!(expect, canonical_name(key));
    }

    #[test]
    fn modes_fit_their_period() {
        MODES.iter().for_each(|m| {
            assert!(m.n * m.dt <= m.period, "{}", m.name);
            assert!(m.t0 + (m.n - 1) * m.dt < m.period, "{}", m.name);
        });
        assert_eq!(Some(&MODES[1]), Mode::by_name("flythru-4"));
        assert_eq!(Some(&MODES[3]), Mode::by_number(3));
        assert_eq!(None, Mode::by_name("Stepping-24"));
    }
}
