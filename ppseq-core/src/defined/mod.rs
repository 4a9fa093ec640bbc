mod unit;

use std::time::Duration;

pub use unit::*;

/// The default TCP port of the device file server
pub const DEFAULT_PORT: u16 = 2001;

/// The default directory of queue files and packets on the device
pub const SEQUENCE_DIR: &str = "/tmp/sequencer_fs";

/// The directory of the sequencer driver variables on the device
pub const DRIVER_DIR: &str = "/proc/sys/dev/sequencer";

/// The default directory of the local packet cache
pub const LOCAL_CACHE_DIR: &str = "/tmp/sequencer/cache";

/// The longest path the embedded file system of the device accepts
pub const MAX_FILENAME_LEN: usize = 254;

/// The number of output channels of a timing unit
pub const NUM_CHANNELS: usize = 24;

/// The number of uploaded packets that makes a partially uploaded queue ready
pub const READY_MIN_UPLOADED: usize = 3;

/// The width in bytes of a queue counter file, including the trailing newline
pub const COUNTER_FILE_WIDTH: usize = 20;

/// The default timeout duration of device round trips and spin loops
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The default number of uploader events kept for a reader
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// The default interval between two polls of a spin loop
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The acquisition queue
pub const ACQUISITION_QUEUE: &str = "queue";

/// The idle queues
pub const IDLE_QUEUES: [&str; 2] = ["queue1", "queue2"];

/// The nominal period of one tick of the 1 kHz clock \[s\]
pub const TICK_PERIOD: f64 = 1e-3;

/// The lower limit of a physical pump-probe delay \[s\]
pub const DELAY_MIN: f64 = -10e-3;

/// The upper limit of a physical pump-probe delay \[s\]
pub const DELAY_MAX: f64 = 100e-3;

/// Integer delays at or above this value are nominal delays in ticks
pub const NOMINAL_DELAY_THRESHOLD: f64 = 48.0;

/// The number of bit slots of the sample translation trigger code
pub const TRANS_CODE_BITS: usize = 32;

/// The period of the nanosecond flash lamp trigger train in ticks
pub const NSF_PERIOD_TICKS: usize = 48;

/// The fraction of the flash lamp period below which a retrigger is dropped
pub const NSF_GUARD_RATIO: f64 = 0.8;

/// Millisecond shutter openings closer than this are merged \[s\]
pub const MS_SHUTTER_MERGE_SPACING: f64 = 24e-3;

/// The largest number of offsets in one index packet
pub const INDEX_CHUNK_LEN: usize = (u16::MAX as usize - 4) / 4;

/// Name of the register counting images
pub const IMAGE_NUMBER: &str = "image_number";

/// Name of the register counting passes
pub const PASS_NUMBER: &str = "pass_number";

/// Name of the register counting X-ray pulses
pub const PULSES: &str = "pulses";

/// Name of the fine delay register of the picosecond oscillator
pub const PSOD2: &str = "psod2";

/// Name of the coarse delay register of the picosecond oscillator
pub const PSOD3: &str = "psod3";

/// Path of a driver variable.
#[must_use]
pub fn driver_variable(name: &str) -> String {
    format!("{DRIVER_DIR}/{name}")
}

/// Path of the variable that gives access to the register `name`.
#[must_use]
pub fn register_variable(name: &str) -> String {
    format!("{DRIVER_DIR}/register/{name}")
}
