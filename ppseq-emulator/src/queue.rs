use ppseq_driver::{
    core::{
        defined::ACQUISITION_QUEUE,
        link::{decode_counter, encode_counter},
    },
    packet::{PacketView, Tlv},
};

use crate::{
    device::{Report, Running},
    DeviceEmulator,
};

impl DeviceEmulator {
    fn path(&self, name: &str) -> String {
        format!("{}/{}", self.option.sequence_dir, name)
    }

    /// The packet ids listed in a queue file.
    #[must_use]
    pub fn queue(&self, queue: &str) -> Vec<String> {
        self.fs
            .get(&self.path(queue))
            .map(|data| {
                String::from_utf8_lossy(data)
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A queue counter, `sequence_count`, `repeat_count` or `max_repeat_count`.
    #[must_use]
    pub fn counter(&self, queue: &str, counter: &str) -> u64 {
        self.fs
            .get(&self.path(&format!("{queue}_{counter}")))
            .ok()
            .and_then(|data| decode_counter(data).ok())
            .unwrap_or(0)
    }

    fn set_counter(&mut self, queue: &str, counter: &str, value: u64) {
        let path = self.path(&format!("{queue}_{counter}"));
        self.fs.put(&path, encode_counter(value).as_bytes());
    }

    pub(crate) fn cancel(&mut self) {
        self.activate = false;
        if self.queue_active {
            tracing::debug!("Acquisition queue cancelled");
            self.queue_active = false;
            self.running = None;
            let default = self.variable("default_queue_name");
            self.set_variable("queue_name", default);
        }
    }

    fn switch_queue(&mut self, queue: String) {
        tracing::trace!("Switching to queue {}", queue);
        let start = self.variable("next_queue_sequence_count");
        if let Ok(start) = start.parse() {
            self.set_counter(&queue, "sequence_count", start);
            self.set_variable("next_queue_sequence_count", "");
        }
        self.set_variable("queue_name", queue);
    }

    fn start_packet(&mut self) {
        if self.activate {
            self.activate = false;
            self.queue_active = true;
            self.switch_queue(ACQUISITION_QUEUE.to_owned());
        }
        let next = self.variable("next_queue_name");
        if !next.is_empty() && !self.queue_active {
            self.set_variable("next_queue_name", "");
            self.switch_queue(next);
        }

        let queue = self.variable("queue_name");
        if queue.is_empty() {
            return;
        }
        let ids = self.queue(&queue);
        if ids.is_empty() {
            return;
        }
        let mut index = self.counter(&queue, "sequence_count") as usize;
        if index >= ids.len() {
            index = 0;
            self.set_counter(&queue, "sequence_count", 0);
        }
        let Ok(data) = self.fs.get(&self.path(&ids[index])) else {
            tracing::trace!("Packet {} of {} is not uploaded yet", ids[index], queue);
            return;
        };
        let decoded = PacketView::parse(data).and_then(|view| {
            let ticks = view.ticks().collect::<Result<Vec<_>, _>>()?;
            Ok(Running {
                descriptor: view.descriptor().unwrap_or_default(),
                ticks,
                position: 0,
            })
        });
        match decoded {
            Ok(running) => self.running = Some(running),
            Err(e) => {
                tracing::warn!("Skipping invalid packet {} of {}: {}", ids[index], queue, e);
                self.finish_packet();
            }
        }
    }

    fn finish_packet(&mut self) {
        self.running = None;
        let queue = self.variable("queue_name");
        let len = self.queue(&queue).len() as u64;
        let count = self.counter(&queue, "sequence_count") + 1;
        if count < len {
            self.set_counter(&queue, "sequence_count", count);
            return;
        }
        self.set_counter(&queue, "sequence_count", 0);
        let repeat = self.counter(&queue, "repeat_count") + 1;
        self.set_counter(&queue, "repeat_count", repeat);
        let max = self.counter(&queue, "max_repeat_count");
        if max > 0 && repeat >= max {
            tracing::debug!("Queue {} finished after {} repeats", queue, repeat);
            if queue == ACQUISITION_QUEUE {
                self.queue_active = false;
            }
            let default = self.variable("default_queue_name");
            self.set_variable("queue_name", default);
        }
    }

    fn execute(&mut self, record: &Tlv) {
        match record {
            Tlv::Write {
                address,
                bitmask,
                value,
            } => self.memory.write(*address, *bitmask, *value),
            Tlv::Increment {
                address,
                bitmask,
                value,
            } => self.memory.increment(*address, *bitmask, *value),
            Tlv::Report {
                address,
                bitmask,
                name,
            } => self.push_report(Report {
                tick: self.ticks,
                name: name.clone(),
                value: self.memory.read(*address, *bitmask),
            }),
            Tlv::Interrupt {
                interrupt_count, ..
            } => self.interrupt_count = *interrupt_count,
            Tlv::Output(text) => tracing::debug!("{}", text),
            _ => {}
        }
    }

    /// Executes one tick.
    ///
    /// At a packet boundary a pending activation of the acquisition queue is applied first,
    /// then a pending switch to `next_queue_name`, and the next packet of the current queue is loaded.
    pub fn tick(&mut self) {
        if self.is_broken() {
            return;
        }
        if self.running.is_none() {
            self.start_packet();
        }
        if let Some(mut running) = self.running.take() {
            let records = std::mem::take(&mut running.ticks[running.position]);
            records.iter().for_each(|r| self.execute(r));
            running.position += 1;
            if running.position < running.ticks.len() {
                self.running = Some(running);
            } else {
                self.finish_packet();
            }
        }
        self.ticks += 1;
    }

    /// Executes `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        (0..ticks).for_each(|_| self.tick());
    }
}
