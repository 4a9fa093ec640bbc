use std::collections::{BTreeMap, VecDeque};

use ppseq_driver::{
    core::{
        defined::DRIVER_DIR,
        link::LinkError,
        register::RegisterTable,
    },
    packet::Tlv,
};

use crate::{EmulatorOption, FileSystem, RegisterMemory};

/// Driver variables of the sequencer and their initial values.
pub const VARIABLES: [(&str, &str); 13] = [
    ("sequence_active", "0"),
    ("default_sequence_active", "0"),
    ("queue_name", ""),
    ("next_queue_name", ""),
    ("default_queue_name", ""),
    ("queue_active", "0"),
    ("next_queue_sequence_count", ""),
    ("buffer_size", "0"),
    ("buffer_length", "0"),
    ("interrupt_handler_enabled", "1"),
    ("reset", "0"),
    ("debug_level", "0"),
    ("descriptor", ""),
];

const READ_ONLY: [&str; 5] = [
    "sequence_active",
    "buffer_length",
    "descriptor",
    "version",
    "registers",
];

/// Default number of reports kept by a [`DeviceEmulator`].
pub const MAX_REPORTS: usize = 4096;

/// A register value reported by a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Tick of the device at which the report was executed
    pub tick: u64,
    /// Register name
    pub name: String,
    /// Register count
    pub value: u32,
}

pub(crate) struct Running {
    pub(crate) descriptor: String,
    pub(crate) ticks: Vec<Vec<Tlv>>,
    pub(crate) position: usize,
}

enum Target<'a> {
    Variable(&'a str),
    Register(&'a str),
    File,
}

fn target(path: &str) -> Target<'_> {
    match path
        .strip_prefix(DRIVER_DIR)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        Some(rest) => match rest.strip_prefix("register/") {
            Some(name) => Target::Register(name),
            None => Target::Variable(rest),
        },
        None => Target::File,
    }
}

fn text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim().to_owned()
}

/// An in-memory timing device.
///
/// Files, driver variables and registers are reached through the same path-based operations as on a real device.
/// [`DeviceEmulator::tick`] executes one tick of the packet queue.
pub struct DeviceEmulator {
    pub(crate) option: EmulatorOption,
    pub(crate) fs: FileSystem,
    pub(crate) memory: RegisterMemory,
    pub(crate) variables: BTreeMap<String, String>,
    pub(crate) queue_active: bool,
    pub(crate) activate: bool,
    pub(crate) running: Option<Running>,
    pub(crate) reports: VecDeque<Report>,
    pub(crate) interrupt_count: u8,
    pub(crate) ticks: u64,
    broken: bool,
}

impl DeviceEmulator {
    /// Creates a new [`DeviceEmulator`].
    #[must_use]
    pub fn new(option: EmulatorOption) -> Self {
        Self {
            option,
            fs: FileSystem::new(),
            memory: RegisterMemory::new(),
            variables: VARIABLES
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            queue_active: false,
            activate: false,
            running: None,
            reports: VecDeque::new(),
            interrupt_count: 0,
            ticks: 0,
            broken: false,
        }
    }

    /// Makes every operation fail until [`DeviceEmulator::repair`] is called.
    pub fn break_down(&mut self) {
        self.broken = true;
    }

    /// Undoes [`DeviceEmulator::break_down`].
    pub fn repair(&mut self) {
        self.broken = false;
    }

    /// Returns `true` while broken down.
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        self.broken
    }

    /// The advertised registers.
    #[must_use]
    pub const fn registers(&self) -> &RegisterTable {
        &self.option.registers
    }

    /// Directory of queue files and packets.
    #[must_use]
    pub fn sequence_dir(&self) -> &str {
        &self.option.sequence_dir
    }

    /// The register memory.
    #[must_use]
    pub const fn memory(&self) -> &RegisterMemory {
        &self.memory
    }

    /// The file system, excluding driver variables and registers.
    #[must_use]
    pub const fn fs(&self) -> &FileSystem {
        &self.fs
    }

    /// The count of register `name`.
    #[must_use]
    pub fn register(&self, name: &str) -> Option<u64> {
        self.option
            .registers
            .find(name)
            .map(|r| self.memory.read(r.address(), r.bitmask()) as u64)
    }

    /// The latest reports, oldest first.
    ///
    /// At most [`EmulatorOption::report_capacity`] reports are kept.
    #[must_use]
    pub const fn reports(&self) -> &VecDeque<Report> {
        &self.reports
    }

    /// Removes and returns the kept reports.
    pub fn take_reports(&mut self) -> Vec<Report> {
        self.reports.drain(..).collect()
    }

    pub(crate) fn push_report(&mut self, report: Report) {
        let capacity = self.option.report_capacity.max(1);
        while self.reports.len() >= capacity {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }

    /// Ticks executed so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The interrupt counter of the last tick.
    #[must_use]
    pub const fn interrupt_count(&self) -> u8 {
        self.interrupt_count
    }

    /// Whether the acquisition queue is running.
    #[must_use]
    pub const fn queue_active(&self) -> bool {
        self.queue_active
    }

    /// The value of a driver variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> String {
        match name {
            "queue_active" => (self.queue_active as u8).to_string(),
            "sequence_active" => (self.running.is_some() as u8).to_string(),
            "buffer_length" => self
                .running
                .as_ref()
                .map_or(0, |r| r.ticks.len())
                .to_string(),
            "descriptor" => self
                .running
                .as_ref()
                .map(|r| r.descriptor.clone())
                .unwrap_or_default(),
            "version" => self.option.version.clone(),
            "registers" => self.option.registers.advertise(),
            _ => self.variables.get(name).cloned().unwrap_or_default(),
        }
    }

    pub(crate) fn set_variable(&mut self, name: &str, value: impl Into<String>) {
        self.variables.insert(name.to_owned(), value.into());
    }

    fn is_variable(&self, name: &str) -> bool {
        READ_ONLY.contains(&name) || self.variables.contains_key(name)
    }

    fn write_variable(&mut self, name: &str, value: String) -> Result<(), LinkError> {
        if READ_ONLY.contains(&name) {
            return Err(LinkError::new(format!("Driver variable {name} is read-only")));
        }
        if !self.is_variable(name) {
            return Err(LinkError::not_found(&format!("{DRIVER_DIR}/{name}")));
        }
        match name {
            "queue_active" => match value.as_str() {
                "1" => self.activate = !self.queue_active,
                "0" | "" => self.cancel(),
                _ => {
                    return Err(LinkError::new(format!(
                        "Invalid value of queue_active: {value}"
                    )))
                }
            },
            "reset" if value == "1" => self.reset(),
            _ => self.set_variable(name, value),
        }
        Ok(())
    }

    fn check(&self) -> Result<(), LinkError> {
        if self.broken {
            return Err(LinkError::new("Device is not responding"));
        }
        Ok(())
    }

    /// Reads a file, driver variable or register.
    pub fn get(&self, path: &str) -> Result<Vec<u8>, LinkError> {
        self.check()?;
        match target(path) {
            Target::Variable(name) => {
                if !self.is_variable(name) {
                    return Err(LinkError::not_found(path));
                }
                Ok(format!("{}\n", self.variable(name)).into_bytes())
            }
            Target::Register(name) => self
                .register(name)
                .map(|count| format!("{count}\n").into_bytes())
                .ok_or_else(|| LinkError::not_found(path)),
            Target::File => self.fs.get(path).map(<[u8]>::to_vec),
        }
    }

    /// Writes a file, driver variable or register.
    pub fn put(&mut self, path: &str, data: &[u8]) -> Result<(), LinkError> {
        self.check()?;
        match target(path) {
            Target::Variable(name) => self.write_variable(name, text(data)),
            Target::Register(name) => {
                let register = self
                    .option
                    .registers
                    .find(name)
                    .ok_or_else(|| LinkError::not_found(path))?;
                let value = text(data);
                let count = value
                    .parse()
                    .map_err(|_| LinkError::new(format!("Invalid count of {name}: {value}")))?;
                self.memory.write(
                    register.address(),
                    register.bitmask(),
                    register.wire_value(count),
                );
                Ok(())
            }
            Target::File => {
                self.fs.put(path, data);
                Ok(())
            }
        }
    }

    /// Deletes a file.
    pub fn del(&mut self, path: &str) -> Result<(), LinkError> {
        self.check()?;
        match target(path) {
            Target::File => self.fs.del(path),
            _ => Err(LinkError::new(format!("Cannot delete {path}"))),
        }
    }

    /// Checks whether a file, driver variable or register exists.
    pub fn exists(&self, path: &str) -> Result<bool, LinkError> {
        self.check()?;
        Ok(match target(path) {
            Target::Variable(name) => self.is_variable(name),
            Target::Register(name) => self.option.registers.find(name).is_some(),
            Target::File => self.fs.exists(path),
        })
    }

    /// Lists the files matching `pattern`.
    pub fn dir(&self, pattern: &str) -> Result<Vec<String>, LinkError> {
        self.check()?;
        self.fs.dir(pattern)
    }

    /// The size of a file, driver variable or register in bytes.
    pub fn size(&self, path: &str) -> Result<u64, LinkError> {
        Ok(self.get(path)?.len() as u64)
    }

    /// Zeroes the registers and stops the running packet.
    pub fn reset(&mut self) {
        tracing::debug!("Resetting the emulated device");
        self.memory.clear();
        self.running = None;
        self.queue_active = false;
        self.activate = false;
        self.interrupt_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use ppseq_driver::core::defined::{driver_variable, register_variable, IMAGE_NUMBER};

    use super::*;

    #[test]
    fn variables() -> anyhow::Result<()> {
        let mut device = DeviceEmulator::new(EmulatorOption::default());
        device.put(&driver_variable("default_queue_name"), b"queue1\n")?;
        assert_eq!(b"queue1\n".to_vec(), device.get(&driver_variable("default_queue_name"))?);
        assert_eq!(b"0\n".to_vec(), device.get(&driver_variable("queue_active"))?);
        assert!(device.exists(&driver_variable("version"))?);
        assert!(!device.exists(&driver_variable("foo"))?);
        assert!(device.put(&driver_variable("version"), b"1").is_err());
        assert!(device.put(&driver_variable("foo"), b"1").is_err());
        assert!(device.get(&driver_variable("foo")).is_err());
        assert!(device.del(&driver_variable("queue_name")).is_err());
        Ok(())
    }

    #[test]
    fn registers() -> anyhow::Result<()> {
        let mut device = DeviceEmulator::new(EmulatorOption::default());
        let advertised = String::from_utf8(device.get(&driver_variable("registers"))?)?;
        assert_eq!(*device.registers(), RegisterTable::parse(&advertised)?);

        device.put(&register_variable(IMAGE_NUMBER), b"42")?;
        assert_eq!(Some(42), device.register(IMAGE_NUMBER));
        assert_eq!(b"42\n".to_vec(), device.get(&register_variable(IMAGE_NUMBER))?);
        assert!(device.put(&register_variable("nothing"), b"1").is_err());
        assert!(device.put(&register_variable(IMAGE_NUMBER), b"x").is_err());

        device.put(&driver_variable("reset"), b"1")?;
        assert_eq!(Some(0), device.register(IMAGE_NUMBER));
        Ok(())
    }

    #[test]
    fn broken() {
        let mut device = DeviceEmulator::new(EmulatorOption::default());
        device.break_down();
        assert!(device.is_broken());
        assert!(device.put("/tmp/a", b"").is_err());
        assert!(device.exists("/tmp/a").is_err());
        device.repair();
        assert_eq!(Ok(()), device.put("/tmp/a", b""));
        assert_eq!(Ok(0), device.size("/tmp/a"));
    }
}
