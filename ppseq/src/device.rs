use std::{
    collections::BTreeMap,
    fmt::Display,
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
};

use getset::Getters;
use ppseq_core::{
    attribute::{Attribute, AttributeValue, LinkStorage, TextFormat},
    calibration::{Calibration, CalibrationLoader, ParameterSource},
    channel::{Channel, ChannelTable},
    defined::{driver_variable, NUM_CHANNELS},
    link::{DeviceLink, DeviceLinkExt},
    register::{Register, RegisterIo, RegisterStorage, RegisterTable},
};
use ppseq_driver::{
    compiler::{packet_id, Compiler, Descriptor},
    sequence::Sequence,
};

use crate::{cache::PacketCache, error::SequencerError, option::SequencerOption};

/// Calibration and channel configuration of a device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    /// Timing calibration
    pub calibration: Calibration,
    /// Channel configuration
    pub channels: ChannelTable,
}

/// A handle to one timing device.
///
/// The register table is read once at connect. Calibration and channel configuration are read from
/// the parameter store of the device and can be reloaded with [`Device::reload`].
#[derive(Getters)]
pub struct Device {
    /// Domain name of the device.
    #[getset(get = "pub")]
    name: String,
    /// The link to the device.
    #[getset(get = "pub")]
    link: Arc<dyn DeviceLink>,
    /// Settings of the device.
    #[getset(get = "pub")]
    option: SequencerOption,
    /// Registers advertised by the device.
    #[getset(get = "pub")]
    registers: RegisterTable,
    /// The two-level packet store.
    #[getset(get = "pub")]
    cache: PacketCache,
    settings: RwLock<Settings>,
    loader: CalibrationLoader,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("option", &self.option)
            .field("registers", &self.registers.len())
            .finish()
    }
}

impl Device {
    /// Connects to a device and discovers its registers and settings.
    ///
    /// A device that does not advertise registers is driven with dummy registers only.
    /// The local packet cache is kept per register layout, since packets carry register addresses
    /// that their ids do not.
    pub fn connect(
        name: impl Into<String>,
        link: Arc<dyn DeviceLink>,
        option: SequencerOption,
    ) -> Result<Self, SequencerError> {
        let name = name.into();
        let registers = match link.get_text(&driver_variable("registers")) {
            Ok(text) => RegisterTable::parse(&text)?,
            Err(e) => {
                tracing::warn!("{}: cannot read the register list: {}", name, e);
                RegisterTable::default()
            }
        };
        tracing::debug!("{}: {} registers advertised", name, registers.len());

        let device = Self {
            cache: PacketCache::new(
                option.local_cache_dir.join(packet_id(&registers.advertise())),
                option.sequence_dir.clone(),
            ),
            name,
            link,
            option,
            registers,
            settings: RwLock::new(Settings::default()),
            loader: CalibrationLoader::new(),
        };
        device.reload();
        Ok(device)
    }

    /// Reads calibration and channel configuration from the parameter store.
    ///
    /// Missing calibration keys take their defaults, reported once per key.
    /// Channels without a valid configuration string keep their defaults.
    pub fn reload(&self) {
        let calibration = self.loader.load(self);
        let channels = ChannelTable::new((1..=NUM_CHANNELS).filter_map(|n| {
            let text = self.parameter(&ChannelTable::parameter_key(n))?;
            Channel::parse_description(n, &text)
                .inspect_err(|e| tracing::warn!("{}: channel {}: {}", self.name, n, e))
                .ok()
        }));
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Settings {
            calibration,
            channels,
        };
    }

    /// A snapshot of calibration and channel configuration.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The timing calibration.
    #[must_use]
    pub fn calibration(&self) -> Calibration {
        self.settings().calibration
    }

    /// The channel configuration.
    #[must_use]
    pub fn channels(&self) -> ChannelTable {
        self.settings().channels
    }

    /// Writes the calibration to the parameter store.
    pub fn set_calibration(&self, calibration: &Calibration) -> Result<(), SequencerError> {
        calibration
            .parameters()
            .into_iter()
            .try_for_each(|(k, v)| self.set_parameter(k, &v))?;
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .calibration = calibration.clone();
        Ok(())
    }

    /// Writes the configuration of one channel to the parameter store.
    pub fn set_channel(&self, channel: Channel) -> Result<(), SequencerError> {
        self.set_parameter(
            &ChannelTable::parameter_key(channel.number()),
            &channel.description(),
        )?;
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .channels
            .set(channel);
        Ok(())
    }

    /// Path of a persistent parameter.
    #[must_use]
    pub fn parameter_path(&self, key: &str) -> String {
        format!("{}/parameters/{}", self.option.sequence_dir, key)
    }

    /// Reads a persistent parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<String> {
        self.link.get_text(&self.parameter_path(key)).ok()
    }

    /// Writes a persistent parameter.
    pub fn set_parameter(&self, key: &str, value: &str) -> Result<(), SequencerError> {
        Ok(self.link.put_text(&self.parameter_path(key), value)?)
    }

    /// Keys of all persistent parameters: the calibration constants, then the channel configurations.
    #[must_use]
    pub fn parameter_keys() -> Vec<String> {
        Calibration::KEYS
            .iter()
            .map(|k| (*k).to_owned())
            .chain((1..=NUM_CHANNELS).map(ChannelTable::parameter_key))
            .collect()
    }

    /// All persistent parameters that are set.
    #[must_use]
    pub fn parameters(&self) -> BTreeMap<String, String> {
        Self::parameter_keys()
            .into_iter()
            .filter_map(|k| self.parameter(&k).map(|v| (k, v)))
            .collect()
    }

    /// Path of a queue file.
    #[must_use]
    pub fn queue_path(&self, queue: &str) -> String {
        format!("{}/{}", self.option.sequence_dir, queue)
    }

    /// Path of a queue counter file, `sequence_count`, `repeat_count` or `max_repeat_count`.
    #[must_use]
    pub fn counter_path(&self, queue: &str, counter: &str) -> String {
        format!("{}/{}_{}", self.option.sequence_dir, queue, counter)
    }

    /// Reads a queue counter.
    pub fn counter(&self, queue: &str, counter: &str) -> Result<u64, SequencerError> {
        Ok(self.link.get_counter(&self.counter_path(queue, counter))?)
    }

    /// Writes a queue counter.
    pub fn set_counter(&self, queue: &str, counter: &str, value: u64) -> Result<(), SequencerError> {
        Ok(self
            .link
            .put_counter(&self.counter_path(queue, counter), value)?)
    }

    /// Reads a driver variable.
    pub fn variable(&self, name: &str) -> Result<String, SequencerError> {
        Ok(self.link.get_text(&driver_variable(name))?)
    }

    /// Writes a driver variable.
    pub fn set_variable(&self, name: &str, value: &str) -> Result<(), SequencerError> {
        Ok(self.link.put_text(&driver_variable(name), value)?)
    }

    /// The register `name`, or a dummy register if the device does not advertise it.
    #[must_use]
    pub fn register(&self, name: &str) -> Register {
        self.registers.get(name)
    }

    /// Reads the count of register `name`.
    pub fn count(&self, name: &str) -> Result<u64, SequencerError> {
        Ok(self.link.read_count(&self.register(name))?)
    }

    /// Writes the count of register `name`.
    pub fn set_count(&self, name: &str, count: i64) -> Result<(), SequencerError> {
        Ok(self.link.write_count(&self.register(name), count)?)
    }

    /// Reads the user value of register `name`.
    pub fn value(&self, name: &str) -> Result<f64, SequencerError> {
        Ok(self.link.read_value(&self.register(name))?)
    }

    /// Writes the user value of register `name`.
    pub fn set_value(&self, name: &str, value: f64) -> Result<(), SequencerError> {
        Ok(self.link.write_value(&self.register(name), value)?)
    }

    /// The count of register `name` as an observable attribute.
    #[must_use]
    pub fn count_attribute(&self, name: &str) -> Attribute<u64> {
        Attribute::new(
            format!("{}.{}.count", self.name, name),
            RegisterStorage::new(self.link.clone(), self.register(name)),
        )
    }

    /// The user value of register `name` as an observable attribute.
    #[must_use]
    pub fn value_attribute(&self, name: &str) -> Attribute<f64> {
        Attribute::new(
            format!("{}.{}.value", self.name, name),
            RegisterStorage::new(self.link.clone(), self.register(name)),
        )
    }

    /// A driver variable as an observable attribute.
    #[must_use]
    pub fn variable_attribute<T>(&self, name: &str) -> Attribute<T>
    where
        T: AttributeValue + FromStr + Display,
    {
        Attribute::new(
            format!("{}.{}", self.name, name),
            LinkStorage::new(self.link.clone(), driver_variable(name), TextFormat::Plain),
        )
    }

    /// A queue counter as an observable attribute.
    #[must_use]
    pub fn counter_attribute(&self, queue: &str, counter: &str) -> Attribute<u64> {
        Attribute::new(
            format!("{}.{}_{}", self.name, queue, counter),
            LinkStorage::new(
                self.link.clone(),
                self.counter_path(queue, counter),
                TextFormat::Counter,
            ),
        )
    }

    /// The descriptor of `seq` under the current settings.
    #[must_use]
    pub fn describe(&self, seq: Sequence<'_>) -> Descriptor {
        let settings = self.settings();
        Compiler::new(&settings.calibration, &settings.channels, &self.registers).describe(seq)
    }

    /// The packet of `seq`, from the cache or freshly compiled.
    pub fn packet(&self, seq: Sequence<'_>) -> Result<(Descriptor, Vec<u8>), SequencerError> {
        let settings = self.settings();
        let compiler = Compiler::new(&settings.calibration, &settings.channels, &self.registers);
        self.cache.packet(self.link.as_ref(), &compiler, seq)
    }
}

impl ParameterSource for Device {
    fn parameter(&self, key: &str) -> Option<String> {
        Device::parameter(self, key)
    }
}
