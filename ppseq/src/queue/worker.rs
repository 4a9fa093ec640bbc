use std::{collections::HashSet, sync::Arc, thread::JoinHandle};

use flume::{Receiver, Sender, TryRecvError, TrySendError};
use indexmap::IndexMap;
use ppseq_driver::compiler::Compiler;

use super::{Command, QueueJob, QueueState, Status, UploadEvent};
use crate::{device::Device, error::SequencerError};

enum Stop {
    Superseded,
    Shutdown,
    Failed(SequencerError),
}

impl From<SequencerError> for Stop {
    fn from(e: SequencerError) -> Self {
        Stop::Failed(e)
    }
}

impl From<ppseq_core::link::LinkError> for Stop {
    fn from(e: ppseq_core::link::LinkError) -> Self {
        Stop::Failed(e.into())
    }
}

struct Uploader {
    device: Arc<Device>,
    commands: Receiver<Command>,
    events: Sender<UploadEvent>,
    backlog: Receiver<UploadEvent>,
    status: Arc<Status>,
    pending: IndexMap<String, QueueJob>,
    shutdown: bool,
}

/// Starts the uploader of `device`.
///
/// The worker owns the pending jobs, one per queue, and processes them in order of arrival.
/// A job for a queue that already has one replaces it, and abandons it if it is running.
/// `events` is a bounded channel; its receiving end is used to discard the oldest event when it is full.
pub(crate) fn spawn(
    device: Arc<Device>,
    commands: Receiver<Command>,
    events: (Sender<UploadEvent>, Receiver<UploadEvent>),
    status: Arc<Status>,
) -> std::io::Result<JoinHandle<()>> {
    let name = format!("ppseq-uploader-{}", device.name());
    let (events, backlog) = events;
    let mut uploader = Uploader {
        device,
        commands,
        events,
        backlog,
        status,
        pending: IndexMap::new(),
        shutdown: false,
    };
    std::thread::Builder::new()
        .name(name)
        .spawn(move || uploader.run())
}

impl Uploader {
    fn run(&mut self) {
        loop {
            if self.pending.is_empty() {
                match self.commands.recv() {
                    Ok(command) => self.accept(command),
                    Err(_) => return,
                }
            }
            self.drain();
            if self.shutdown {
                tracing::debug!("{}: uploader stopped", self.device.name());
                return;
            }
            let Some((queue, job)) = self.pending.shift_remove_index(0) else {
                continue;
            };
            match self.process(&job) {
                Ok(ids) => {
                    self.emit(UploadEvent::Published {
                        queue: queue.clone(),
                        ids: ids.clone(),
                    });
                    self.status.set(&queue, QueueState::Published(ids));
                }
                Err(Stop::Superseded) => {
                    tracing::debug!("{}: upload of {} superseded", self.device.name(), queue);
                    self.emit(UploadEvent::Superseded { queue });
                }
                Err(Stop::Shutdown) => {
                    tracing::debug!("{}: upload of {} cancelled", self.device.name(), queue);
                    return;
                }
                Err(Stop::Failed(e)) => {
                    tracing::error!("{}: upload of {} failed: {}", self.device.name(), queue, e);
                    self.emit(UploadEvent::Failed {
                        queue: queue.clone(),
                        error: e.to_string(),
                    });
                    self.status.set(&queue, QueueState::Failed(e.to_string()));
                }
            }
        }
    }

    fn emit(&self, mut event: UploadEvent) {
        loop {
            match self.events.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(e)) => {
                    if let Ok(old) = self.backlog.try_recv() {
                        tracing::trace!("{}: unread event discarded: {:?}", self.device.name(), old);
                    }
                    event = e;
                }
                Err(TrySendError::Disconnected(e)) => {
                    tracing::trace!("{}: no reader for event {:?}", self.device.name(), e);
                    return;
                }
            }
        }
    }

    fn accept(&mut self, command: Command) {
        match command {
            Command::SetQueue(job) => {
                self.status.set(&job.queue, QueueState::Pending);
                self.pending.shift_remove(&job.queue);
                self.pending.insert(job.queue.clone(), job);
            }
            Command::Shutdown => self.shutdown = true,
        }
    }

    fn drain(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.accept(command),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.shutdown = true;
                    return;
                }
            }
        }
    }

    fn checkpoint(&mut self, queue: &str) -> Result<(), Stop> {
        self.drain();
        if self.shutdown {
            return Err(Stop::Shutdown);
        }
        if self.pending.contains_key(queue) {
            return Err(Stop::Superseded);
        }
        Ok(())
    }

    fn progress(&self, queue: &str, uploaded: usize, total: usize) {
        self.status
            .set(queue, QueueState::Uploading { uploaded, total });
        self.emit(UploadEvent::Progress {
            queue: queue.to_owned(),
            uploaded,
            total,
        });
    }

    fn process(&mut self, job: &QueueJob) -> Result<Vec<String>, Stop> {
        let device = self.device.clone();
        let settings = device.settings();
        let compiler = Compiler::new(&settings.calibration, &settings.channels, device.registers());
        let cache = device.cache();
        let link = device.link();

        let ids = job
            .sequences
            .iter()
            .map(|seq| compiler.describe(seq).id)
            .collect::<Vec<_>>();
        let mut distinct = IndexMap::new();
        ids.iter().enumerate().for_each(|(i, id)| {
            distinct.entry(id.as_str()).or_insert(i);
        });
        let total = distinct.len();

        let remote = link
            .dir(&cache.remote_path("*"))?
            .into_iter()
            .collect::<HashSet<_>>();
        let missing = distinct
            .iter()
            .filter(|(id, _)| !remote.contains(&cache.remote_path(id)))
            .map(|(id, i)| (*id, *i))
            .collect::<Vec<_>>();
        let mut uploaded = total - missing.len();
        self.progress(&job.queue, uploaded, total);

        let (cached, uncached): (Vec<_>, Vec<_>) = missing
            .into_iter()
            .map(|(id, i)| (id, i, cache.load_local(id)))
            .partition(|(_, _, data)| data.is_some());
        let files = cached
            .into_iter()
            .filter_map(|(id, _, data)| data.map(|data| (cache.remote_path(id), data)))
            .collect::<Vec<_>>();
        if !files.is_empty() {
            self.checkpoint(&job.queue)?;
            link.put_many(&files)?;
            uploaded += files.len();
            tracing::debug!(
                "{}: {} cached packets of {} uploaded",
                device.name(),
                files.len(),
                job.queue
            );
            self.progress(&job.queue, uploaded, total);
        }

        for (id, i) in uncached.into_iter().map(|(id, i, _)| (id, i)) {
            self.checkpoint(&job.queue)?;
            let Some(seq) = job.sequences.get(i) else {
                continue;
            };
            let (descriptor, _) = cache.generate(link.as_ref(), &compiler, seq)?;
            debug_assert_eq!(id, descriptor.id);
            uploaded += 1;
            self.progress(&job.queue, uploaded, total);
        }

        self.checkpoint(&job.queue)?;
        let content = ids.iter().map(|id| format!("{id}\n")).collect::<String>();
        link.put(&device.queue_path(&job.queue), content.as_bytes())?;
        if let Some(name) = &job.default_queue_name {
            device.set_variable("default_queue_name", name)?;
        }
        if let Some(name) = &job.next_queue_name {
            device.set_variable("next_queue_name", name)?;
        }
        tracing::info!(
            "{}: queue {} published with {} scan points ({} packets)",
            device.name(),
            job.queue,
            ids.len(),
            total
        );
        Ok(ids)
    }
}
