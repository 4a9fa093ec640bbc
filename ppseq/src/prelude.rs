pub use crate::{
    cache::PacketCache,
    config::{Configuration, ConfigurationStore},
    device::{Device, Settings},
    error::SequencerError,
    option::SequencerOption,
    queue::{QueueJob, QueueState, UploadEvent},
    registry::DeviceRegistry,
    sequencer::{Progress, Sequencer},
};

#[cfg(feature = "link-emulated")]
pub use crate::link::{Emulated, EmulatedSleeper};

pub use ppseq_core::{
    attribute::{Attribute, Event, Handler, Timestamps},
    calibration::Calibration,
    channel::{Channel, ChannelTable, Gated, Special, Timed},
    defined::{ms, ns, us, ACQUISITION_QUEUE, IDLE_QUEUES},
    link::{DeviceLink, DeviceLinkExt, LinkError},
    register::{Register, RegisterTable},
    sleep::{Sleep, StdSleeper},
};
pub use ppseq_driver::{
    compiler::{Compiler, Descriptor},
    sequence::{Sequence, SequenceParameters, Sequences},
};
