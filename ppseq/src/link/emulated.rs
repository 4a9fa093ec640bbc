use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use ppseq_core::{
    link::{DeviceLink, LinkError},
    sleep::Sleep,
};
use ppseq_emulator::{DeviceEmulator, EmulatorOption};

/// A [`DeviceLink`] to an in-process [`DeviceEmulator`].
///
/// The emulator only advances when ticked, either directly through [`Emulated::emulator`]
/// or by waiting with the sleeper returned by [`Emulated::sleeper`].
#[derive(Clone)]
pub struct Emulated {
    device: Arc<Mutex<DeviceEmulator>>,
}

impl Default for Emulated {
    fn default() -> Self {
        Self::new(EmulatorOption::default())
    }
}

impl Emulated {
    /// Creates a new [`Emulated`].
    #[must_use]
    pub fn new(option: EmulatorOption) -> Self {
        Self {
            device: Arc::new(Mutex::new(DeviceEmulator::new(option))),
        }
    }

    /// Locks the emulator.
    pub fn emulator(&self) -> MutexGuard<'_, DeviceEmulator> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A sleeper that executes one emulator tick per millisecond of sleep.
    #[must_use]
    pub fn sleeper(&self) -> EmulatedSleeper {
        EmulatedSleeper {
            device: self.device.clone(),
            tick: Duration::from_millis(1),
        }
    }
}

impl DeviceLink for Emulated {
    fn put(&self, path: &str, data: &[u8]) -> Result<(), LinkError> {
        self.emulator().put(path, data)
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, LinkError> {
        self.emulator().get(path)
    }

    fn del(&self, path: &str) -> Result<(), LinkError> {
        self.emulator().del(path)
    }

    fn exists(&self, path: &str) -> Result<bool, LinkError> {
        self.emulator().exists(path)
    }

    fn dir(&self, pattern: &str) -> Result<Vec<String>, LinkError> {
        self.emulator().dir(pattern)
    }

    fn size(&self, path: &str) -> Result<u64, LinkError> {
        self.emulator().size(path)
    }

    fn put_many(&self, files: &[(String, Vec<u8>)]) -> Result<(), LinkError> {
        let mut device = self.emulator();
        files
            .iter()
            .try_for_each(|(path, data)| device.put(path, data))
    }

    fn is_online(&self) -> bool {
        !self.emulator().is_broken()
    }
}

/// A [`Sleep`] that advances an [`Emulated`] device instead of waiting.
#[derive(Clone)]
pub struct EmulatedSleeper {
    device: Arc<Mutex<DeviceEmulator>>,
    tick: Duration,
}

impl EmulatedSleeper {
    /// Sets the sleep duration that corresponds to one tick.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

impl std::fmt::Debug for EmulatedSleeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedSleeper")
            .field("tick", &self.tick)
            .finish()
    }
}

impl Sleep for EmulatedSleeper {
    fn sleep(&self, duration: Duration) {
        let tick = self.tick.as_nanos().max(1);
        let ticks = duration.as_nanos().div_ceil(tick).max(1) as u64;
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .run(ticks);
        std::thread::yield_now();
    }
}
