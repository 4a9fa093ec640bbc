use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    sync::{Arc, Mutex, PoisonError},
    thread::JoinHandle,
};

use derive_more::Display;
use flume::{Receiver, Sender};
use ppseq_core::{
    defined::{ACQUISITION_QUEUE, IMAGE_NUMBER, PASS_NUMBER, PULSES, READY_MIN_UPLOADED},
    link::DeviceLink,
    sleep::{Sleep, StdSleeper},
};
use ppseq_driver::sequence::Sequences;

use crate::{
    device::Device,
    error::SequencerError,
    option::SequencerOption,
    queue::{self, Command, QueueJob, QueueState, Status, UploadEvent},
};

/// A snapshot of the acquisition progress.
#[derive(Clone, Debug, PartialEq, Eq, Default, Display)]
#[display(
    "{queue_name} (active: {queue_active}): image {image_number}, pass {pass_number}, {pulses} pulses, sequence {sequence_count}, repeat {repeat_count}"
)]
pub struct Progress {
    /// Images completed
    pub image_number: u64,
    /// Passes started
    pub pass_number: u64,
    /// X-ray pulses emitted
    pub pulses: u64,
    /// Queue being executed
    pub queue_name: String,
    /// Whether the acquisition queue is running
    pub queue_active: bool,
    /// Position in the acquisition queue
    pub sequence_count: u64,
    /// Completed passes of the acquisition queue
    pub repeat_count: u64,
}

/// The queue runtime of one device.
///
/// Queues are programmed by a dedicated uploader thread. Acquisition control talks to the device directly.
pub struct Sequencer {
    device: Arc<Device>,
    sleeper: Arc<dyn Sleep>,
    commands: Sender<Command>,
    events: Receiver<UploadEvent>,
    status: Arc<Status>,
    jobs: Mutex<HashMap<String, QueueJob>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("device", &self.device)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl Sequencer {
    /// Creates a new [`Sequencer`] and starts its uploader.
    ///
    /// `sleeper` paces every wait for the device.
    pub fn new(device: Arc<Device>, sleeper: Arc<dyn Sleep>) -> Result<Self, SequencerError> {
        let (commands, receiver) = flume::unbounded();
        let (sender, events) = flume::bounded(device.option().event_capacity.max(1));
        let status = Arc::new(Status::default());
        let worker = queue::spawn(
            device.clone(),
            receiver,
            (sender, events.clone()),
            status.clone(),
        )?;
        Ok(Self {
            device,
            sleeper,
            commands,
            events,
            status,
            jobs: Mutex::new(HashMap::new()),
            worker: Some(worker),
        })
    }

    /// Connects to a device and creates its [`Sequencer`].
    pub fn open(
        name: impl Into<String>,
        link: Arc<dyn DeviceLink>,
        option: SequencerOption,
    ) -> Result<Self, SequencerError> {
        let device = Device::connect(name, link, option)?;
        Self::new(Arc::new(device), Arc::new(StdSleeper))
    }

    /// The device.
    #[must_use]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Events of the uploader.
    ///
    /// At most [`SequencerOption::event_capacity`] unread events are kept, the newest ones.
    #[must_use]
    pub fn events(&self) -> Receiver<UploadEvent> {
        self.events.clone()
    }

    /// Whether the device is reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.device.link().is_online()
    }

    fn submit(&self, job: QueueJob) -> Result<(), SequencerError> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.queue.clone(), job.clone());
        let queue = job.queue.clone();
        self.status.set(&queue, QueueState::Pending);
        self.commands
            .send(Command::SetQueue(job))
            .map_err(|_| SequencerError::WorkerStopped(self.device.name().clone()))?;
        tracing::debug!("{}: upload of {} requested", self.device.name(), queue);
        Ok(())
    }

    fn job(&self, queue: &str) -> Option<QueueJob> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(queue)
            .cloned()
    }

    /// Programs `queue` with `sequences` in the background.
    ///
    /// A later call for the same queue supersedes this one.
    /// After the upload, `default_queue_name` and `next_queue_name` are published if given.
    /// Scan points of the acquisition queue are marked as acquiring.
    pub fn set_queue_sequences(
        &self,
        sequences: Sequences,
        queue: &str,
        default_queue_name: Option<&str>,
        next_queue_name: Option<&str>,
    ) -> Result<(), SequencerError> {
        let sequences = sequences.with_acquiring(queue == ACQUISITION_QUEUE);
        let mut job = QueueJob::new(queue, sequences);
        job.default_queue_name = default_queue_name.map(str::to_owned);
        job.next_queue_name = next_queue_name.map(str::to_owned);
        self.submit(job)
    }

    /// Programs `queue` with the scan points of a line of the sequence language.
    ///
    /// A line that cannot be parsed programs an empty queue.
    pub fn set_queue_text(
        &self,
        input: &str,
        queue: &str,
        default_queue_name: Option<&str>,
        next_queue_name: Option<&str>,
    ) -> Result<(), SequencerError> {
        self.set_queue_sequences(
            Sequences::parse(input),
            queue,
            default_queue_name,
            next_queue_name,
        )
    }

    /// The state of `queue` as seen by the uploader.
    #[must_use]
    pub fn queue_state(&self, queue: &str) -> Option<QueueState> {
        self.status.get(queue)
    }

    /// Waits until the uploader is done with `queue` and returns the published ids.
    ///
    /// A queue that was never programmed by this sequencer returns the ids of its queue file.
    pub fn wait_uploaded(&self, queue: &str) -> Result<Vec<String>, SequencerError> {
        let timeout = self.device.option().timeout;
        match self.status.wait_finished(queue, timeout) {
            None => Err(SequencerError::Timeout {
                what: format!("upload of {queue}"),
                timeout,
            }),
            Some(Some(QueueState::Failed(reason))) => Err(SequencerError::UploadFailed {
                queue: queue.to_owned(),
                reason,
            }),
            Some(Some(QueueState::Published(ids))) => Ok(ids),
            Some(_) => self.queue_content(queue),
        }
    }

    /// The packet ids of the queue file of `queue`. A missing queue file is an empty queue.
    pub fn queue_content(&self, queue: &str) -> Result<Vec<String>, SequencerError> {
        let path = self.device.queue_path(queue);
        let link = self.device.link();
        if !link.exists(&path)? {
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&link.get(&path)?)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Whether the device can start `queue`: all its packets are on the device, or at least three of them.
    pub fn queue_ready(&self, queue: &str) -> Result<bool, SequencerError> {
        let ids = self.queue_content(queue)?;
        if ids.is_empty() {
            return Ok(false);
        }
        let cache = self.device.cache();
        let remote = self
            .device
            .link()
            .dir(&cache.remote_path("*"))?
            .into_iter()
            .collect::<HashSet<_>>();
        let distinct = ids.iter().collect::<HashSet<_>>();
        let uploaded = distinct
            .iter()
            .filter(|id| remote.contains(&cache.remote_path(id)))
            .count();
        Ok(uploaded == distinct.len() || uploaded >= READY_MIN_UPLOADED)
    }

    /// Waits until `queue` is uploaded and ready.
    ///
    /// If packets of the queue file are missing, the last request for the queue is submitted again.
    pub fn wait_ready(&self, queue: &str) -> Result<(), SequencerError> {
        let ids = self.wait_uploaded(queue)?;
        if ids.is_empty() {
            return Err(SequencerError::EmptyQueue(queue.to_owned()));
        }
        if self.queue_ready(queue)? {
            return Ok(());
        }
        let Some(job) = self.job(queue) else {
            return Err(SequencerError::Timeout {
                what: format!("packets of {queue}"),
                timeout: self.device.option().timeout,
            });
        };
        tracing::warn!("{}: packets of {} are missing, uploading again", self.device.name(), queue);
        self.submit(job)?;
        self.wait_uploaded(queue)?;
        if self.queue_ready(queue)? {
            return Ok(());
        }
        Err(SequencerError::Timeout {
            what: format!("packets of {queue}"),
            timeout: self.device.option().timeout,
        })
    }

    fn spin(
        &self,
        what: &str,
        mut done: impl FnMut() -> Result<bool, SequencerError>,
    ) -> Result<(), SequencerError> {
        let option = self.device.option();
        let polls = (option.timeout.as_nanos() / option.poll_interval.as_nanos().max(1)).max(1);
        for _ in 0..polls {
            if done()? {
                return Ok(());
            }
            self.sleeper.sleep(option.poll_interval);
        }
        if done()? {
            return Ok(());
        }
        Err(SequencerError::Timeout {
            what: what.to_owned(),
            timeout: option.timeout,
        })
    }

    fn queue_active(&self) -> Result<bool, SequencerError> {
        Ok(self.device.variable("queue_active")? == "1")
    }

    fn activate(&self) -> Result<(), SequencerError> {
        self.device.set_variable("queue_active", "1")?;
        self.spin("queue_active=1", || self.queue_active())
    }

    /// Starts the acquisition queue from its first scan point and runs it once.
    pub fn acquisition_start(&self) -> Result<(), SequencerError> {
        let len = self.wait_uploaded(ACQUISITION_QUEUE)?.len() as u64;
        self.acquisition_start_with_range(0..len)
    }

    /// Starts the acquisition queue at scan point `range.start` and stops it after scan point `range.end - 1`.
    ///
    /// Scan points are counted over repeats of the queue, so a range may exceed the queue length.
    pub fn acquisition_start_with_range(&self, range: Range<u64>) -> Result<(), SequencerError> {
        self.wait_ready(ACQUISITION_QUEUE)?;
        let len = self.queue_content(ACQUISITION_QUEUE)?.len() as u64;
        if len == 0 {
            return Err(SequencerError::EmptyQueue(ACQUISITION_QUEUE.to_owned()));
        }

        self.device.set_variable("queue_active", "0")?;
        [IMAGE_NUMBER, PASS_NUMBER, PULSES]
            .into_iter()
            .try_for_each(|name| self.device.set_count(name, 0))?;
        self.device
            .set_counter(ACQUISITION_QUEUE, "sequence_count", 0)?;
        self.device
            .set_counter(ACQUISITION_QUEUE, "repeat_count", range.start / len)?;
        self.device.set_counter(
            ACQUISITION_QUEUE,
            "max_repeat_count",
            range.end.div_ceil(len),
        )?;
        self.device.set_variable(
            "next_queue_sequence_count",
            &(range.start % len).to_string(),
        )?;
        self.activate()?;
        tracing::info!(
            "{}: acquisition of scan points {:?} started",
            self.device.name(),
            range
        );
        Ok(())
    }

    /// Requests the acquisition queue to stop. The device drops to the default queue at the end of the current tick.
    pub fn cancel(&self) -> Result<(), SequencerError> {
        self.device.set_variable("queue_active", "0")?;
        tracing::debug!("{}: acquisition cancelled", self.device.name());
        Ok(())
    }

    /// Waits until the acquisition queue is not running.
    pub fn wait_inactive(&self) -> Result<(), SequencerError> {
        self.spin("queue_active=0", || self.queue_active().map(|active| !active))
    }

    /// Uploads the acquisition queue again with its last scan points and starts it where the device stopped.
    pub fn resume(&self) -> Result<(), SequencerError> {
        let job = self
            .job(ACQUISITION_QUEUE)
            .ok_or_else(|| SequencerError::EmptyQueue(ACQUISITION_QUEUE.to_owned()))?;
        self.submit(job)?;
        self.wait_ready(ACQUISITION_QUEUE)?;
        self.activate()?;
        tracing::info!("{}: acquisition resumed", self.device.name());
        Ok(())
    }

    /// The current progress of the acquisition.
    pub fn progress(&self) -> Result<Progress, SequencerError> {
        Ok(Progress {
            image_number: self.device.count(IMAGE_NUMBER)?,
            pass_number: self.device.count(PASS_NUMBER)?,
            pulses: self.device.count(PULSES)?,
            queue_name: self.device.variable("queue_name")?,
            queue_active: self.queue_active()?,
            sequence_count: self.device.counter(ACQUISITION_QUEUE, "sequence_count")?,
            repeat_count: self.device.counter(ACQUISITION_QUEUE, "repeat_count")?,
        })
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
