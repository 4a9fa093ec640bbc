mod table;

use std::{collections::BTreeMap, fmt, str::FromStr};

use derive_more::Display;
use getset::{CopyGetters, Getters};
use thiserror::Error;

pub use table::ChannelTable;

/// An error produced when parsing a channel configuration.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum ChannelError {
    /// Unknown value of an enumerated setting.
    #[error("Invalid {key}: {value:?}")]
    InvalidValue {
        /// Setting name
        key: &'static str,
        /// Rejected value
        value: String,
    },
    /// Channel number out of range.
    #[error("Channel number {0} is out of range ([1, {max}])", max = crate::defined::NUM_CHANNELS)]
    InvalidNumber(usize),
}

/// The emission rule of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Display)]
pub enum Special {
    /// Ordinary pulse output
    #[default]
    #[display("")]
    None,
    /// X-ray millisecond shutter
    #[display("ms")]
    Ms,
    /// Sample translation bit-serial trigger
    #[display("trans")]
    Trans,
    /// Picosecond oscillator reference
    #[display("pso")]
    Pso,
    /// Nanosecond flash lamp
    #[display("nsf")]
    Nsf,
}

impl FromStr for Special {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Special::None),
            "ms" => Ok(Special::Ms),
            "trans" => Ok(Special::Trans),
            "pso" => Ok(Special::Pso),
            "nsf" => Ok(Special::Nsf),
            _ => Err(ChannelError::InvalidValue {
                key: "special",
                value: s.to_owned(),
            }),
        }
    }
}

/// The timing reference of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Display)]
pub enum Timed {
    /// Follows the laser pulses
    #[display("pump")]
    Pump,
    /// Follows the X-ray pulses
    #[default]
    #[display("probe")]
    Probe,
    /// Fires once per packet
    #[display("period")]
    Period,
}

impl FromStr for Timed {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pump" => Ok(Timed::Pump),
            "probe" => Ok(Timed::Probe),
            "period" => Ok(Timed::Period),
            _ => Err(ChannelError::InvalidValue {
                key: "timed",
                value: s.to_owned(),
            }),
        }
    }
}

/// The sequence flag that enables a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Gated {
    /// `laser_on`
    #[display("pump")]
    Pump,
    /// `ms_on`
    #[display("probe")]
    Probe,
    /// `xdet_on`
    #[display("detector")]
    Detector,
    /// `z != 0`
    #[display("trans")]
    Trans,
}

impl FromStr for Gated {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pump" => Ok(Gated::Pump),
            "probe" => Ok(Gated::Probe),
            "detector" => Ok(Gated::Detector),
            "trans" => Ok(Gated::Trans),
            _ => Err(ChannelError::InvalidValue {
                key: "gated",
                value: s.to_owned(),
            }),
        }
    }
}

/// The registers each channel owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SubRegister {
    /// Fine delay count
    #[display("delay")]
    Delay,
    /// Trigger enable
    #[display("enable")]
    Enable,
    /// Output level of millisecond channels
    #[display("state")]
    State,
    /// Pulse output
    #[display("pulse")]
    Pulse,
    /// Trigger counter
    #[display("trig_count")]
    TrigCount,
    /// Acquisition trigger counter
    #[display("acq_count")]
    AcqCount,
    /// Acquisition counter
    #[display("acq")]
    Acq,
    /// Manual override enable
    #[display("override")]
    Override,
    /// Manual override level
    #[display("override_state")]
    OverrideState,
}

impl SubRegister {
    /// All sub-registers.
    pub const ALL: [SubRegister; 9] = [
        SubRegister::Delay,
        SubRegister::Enable,
        SubRegister::State,
        SubRegister::Pulse,
        SubRegister::TrigCount,
        SubRegister::AcqCount,
        SubRegister::Acq,
        SubRegister::Override,
        SubRegister::OverrideState,
    ];
}

/// A physical output of the timing unit.
#[derive(Clone, Debug, PartialEq, Getters, CopyGetters)]
pub struct Channel {
    /// Channel number, starting at 1.
    #[getset(get_copy = "pub")]
    number: usize,
    /// Short name.
    #[getset(get = "pub")]
    mnemonic: String,
    /// Whether the channel participates in piano-player sequencing.
    #[getset(get_copy = "pub")]
    pp_enabled: bool,
    /// Emission rule.
    #[getset(get_copy = "pub")]
    special: Special,
    /// Timing reference.
    #[getset(get_copy = "pub")]
    timed: Timed,
    /// Enabling flag, if any.
    #[getset(get_copy = "pub")]
    gated: Option<Gated>,
    /// Whether triggers are counted.
    #[getset(get_copy = "pub")]
    counter_enabled: bool,
    /// Delay of the output relative to its reference \[s\].
    #[getset(get_copy = "pub")]
    offset: f64,
    /// Hardware delay of a precision channel \[s\]. NaN for a millisecond-resolution channel.
    #[getset(get_copy = "pub")]
    offset_hw: f64,
    /// Length of an output pulse \[s\].
    #[getset(get_copy = "pub")]
    pulse_length: f64,
    /// Repetition period in ticks, 0 for none.
    #[getset(get_copy = "pub")]
    repeat_period: usize,
}

impl Channel {
    /// Creates a disabled channel with default settings.
    pub fn new(number: usize) -> Result<Self, ChannelError> {
        if !(1..=crate::defined::NUM_CHANNELS).contains(&number) {
            return Err(ChannelError::InvalidNumber(number));
        }
        Ok(Self::unchecked(number))
    }

    pub(crate) fn unchecked(number: usize) -> Self {
        Self {
            number,
            mnemonic: String::new(),
            pp_enabled: false,
            special: Special::None,
            timed: Timed::Probe,
            gated: None,
            counter_enabled: false,
            offset: 0.,
            offset_hw: f64::NAN,
            pulse_length: 0.,
            repeat_period: 0,
        }
    }

    /// Sets the mnemonic.
    #[must_use]
    pub fn with_mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = mnemonic.into();
        self
    }

    /// Enables piano-player sequencing.
    #[must_use]
    pub const fn with_pp_enabled(mut self, pp_enabled: bool) -> Self {
        self.pp_enabled = pp_enabled;
        self
    }

    /// Sets the emission rule.
    #[must_use]
    pub const fn with_special(mut self, special: Special) -> Self {
        self.special = special;
        self
    }

    /// Sets the timing reference.
    #[must_use]
    pub const fn with_timed(mut self, timed: Timed) -> Self {
        self.timed = timed;
        self
    }

    /// Sets the enabling flag.
    #[must_use]
    pub const fn with_gated(mut self, gated: Option<Gated>) -> Self {
        self.gated = gated;
        self
    }

    /// Enables the trigger counter.
    #[must_use]
    pub const fn with_counter_enabled(mut self, counter_enabled: bool) -> Self {
        self.counter_enabled = counter_enabled;
        self
    }

    /// Sets the delay relative to the reference.
    #[must_use]
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the hardware delay, making this a precision channel unless it is NaN.
    #[must_use]
    pub fn with_offset_hw(mut self, offset_hw: f64) -> Self {
        self.offset_hw = offset_hw;
        self
    }

    /// Sets the pulse length.
    #[must_use]
    pub fn with_pulse_length(mut self, pulse_length: f64) -> Self {
        self.pulse_length = pulse_length;
        self
    }

    /// Sets the repetition period.
    #[must_use]
    pub const fn with_repeat_period(mut self, repeat_period: usize) -> Self {
        self.repeat_period = repeat_period;
        self
    }

    /// Returns `true` for a precision-timed channel.
    #[must_use]
    pub fn is_precision(&self) -> bool {
        !self.offset_hw.is_nan()
    }

    /// Name of one of the registers this channel owns.
    #[must_use]
    pub fn register_name(&self, sub: SubRegister) -> String {
        format!("ch{}_{}", self.number, sub)
    }

    /// The canonical configuration string, used in packet descriptors and persisted configurations.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Parses a configuration string produced by [`Channel::description`].
    ///
    /// Missing keys keep their defaults and unknown keys are ignored.
    pub fn parse_description(number: usize, text: &str) -> Result<Self, ChannelError> {
        let fields = text
            .split(',')
            .filter_map(|kv| kv.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim().trim_matches('\'')))
            .collect::<BTreeMap<_, _>>();
        let flag = |key: &'static str| -> Result<Option<bool>, ChannelError> {
            fields
                .get(key)
                .map(|v| match *v {
                    "1" | "True" | "true" => Ok(true),
                    "0" | "False" | "false" => Ok(false),
                    v => Err(ChannelError::InvalidValue {
                        key,
                        value: v.to_owned(),
                    }),
                })
                .transpose()
        };
        let number_of = |key: &'static str| -> Result<Option<f64>, ChannelError> {
            fields
                .get(key)
                .map(|v| {
                    v.parse().map_err(|_| ChannelError::InvalidValue {
                        key,
                        value: (*v).to_owned(),
                    })
                })
                .transpose()
        };

        let mut channel = Channel::new(number)?;
        if let Some(mnemonic) = fields.get("mnemonic") {
            channel.mnemonic = (*mnemonic).to_owned();
        }
        if let Some(v) = flag("PP_enabled")? {
            channel.pp_enabled = v;
        }
        if let Some(v) = fields.get("special") {
            channel.special = v.parse()?;
        }
        if let Some(v) = fields.get("timed") {
            channel.timed = v.parse()?;
        }
        if let Some(v) = fields.get("gated") {
            channel.gated = match *v {
                "" | "None" => None,
                v => Some(v.parse()?),
            };
        }
        if let Some(v) = flag("counter_enabled")? {
            channel.counter_enabled = v;
        }
        if let Some(v) = number_of("offset")? {
            channel.offset = v;
        }
        if let Some(v) = number_of("offset_HW")? {
            channel.offset_hw = v;
        }
        if let Some(v) = number_of("pulse_length")? {
            channel.pulse_length = v;
        }
        if let Some(v) = number_of("repeat_period")? {
            channel.repeat_period = v as usize;
        }
        Ok(channel)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mnemonic='{}',PP_enabled={},special='{}',timed='{}',gated='{}',counter_enabled={},offset={:?},offset_HW={:?},pulse_length={:?},repeat_period={}",
            self.mnemonic,
            self.pp_enabled as u8,
            self.special,
            self.timed,
            self.gated.map(|g| g.to_string()).unwrap_or_default(),
            self.counter_enabled as u8,
            self.offset,
            self.offset_hw,
            self.pulse_length,
            self.repeat_period
        )
    }
}
