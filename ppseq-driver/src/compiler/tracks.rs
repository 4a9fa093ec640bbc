use indexmap::IndexMap;
use ppseq_core::register::RegisterTable;

use super::{RegisterTrack, TrackKind};

/// Collects register events by register name and kind, in order of first use.
pub(crate) struct TrackBuilder<'a> {
    registers: &'a RegisterTable,
    tracks: IndexMap<(String, TrackKind), RegisterTrack>,
}

impl<'a> TrackBuilder<'a> {
    pub(crate) fn new(registers: &'a RegisterTable) -> Self {
        Self {
            registers,
            tracks: IndexMap::new(),
        }
    }

    fn track(&mut self, name: &str, kind: TrackKind) -> Option<&mut RegisterTrack> {
        let register = self.registers.get(name);
        if register.is_dummy() {
            return None;
        }
        Some(
            self.tracks
                .entry((name.to_owned(), kind))
                .or_insert_with(|| RegisterTrack::new(register, kind)),
        )
    }

    pub(crate) fn write(&mut self, name: &str, tick: usize, count: u64) {
        if let Some(track) = self.track(name, TrackKind::Write) {
            track.events.insert(tick, count);
        }
    }

    pub(crate) fn increment(&mut self, name: &str, tick: usize, count: u64) {
        if let Some(track) = self.track(name, TrackKind::Increment) {
            *track.events.entry(tick).or_default() += count;
        }
    }

    pub(crate) fn report(&mut self, name: &str, tick: usize) {
        if let Some(track) = self.track(name, TrackKind::Report) {
            track.events.insert(tick, 0);
        }
    }

    /// Writes a register that holds `states[t]` during tick `t`.
    pub(crate) fn states(&mut self, name: &str, states: &[u64]) {
        if let Some(track) = self.track(name, TrackKind::Write) {
            states
                .iter()
                .enumerate()
                .filter(|&(t, s)| t == 0 || states[t - 1] != *s)
                .for_each(|(t, &s)| {
                    track.events.insert(t, s);
                });
        }
    }

    pub(crate) fn build(self) -> Vec<RegisterTrack> {
        self.tracks.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use ppseq_core::register::Register;

    use super::*;

    #[test]
    fn sparse_states() -> anyhow::Result<()> {
        let registers = RegisterTable::new([Register::new("ch1_state", 0x10, 0, 1)?]);
        let mut builder = TrackBuilder::new(&registers);
        builder.states("ch1_state", &[1, 1, 0, 0, 1]);
        builder.states("ch2_state", &[1, 0]);
        builder.increment("ch1_state", 3, 1);
        builder.increment("ch1_state", 3, 1);
        let tracks = builder.build();
        assert_eq!(2, tracks.len());
        assert_eq!(TrackKind::Write, tracks[0].kind);
        assert_eq!(
            vec![(0, 1), (2, 0), (4, 1)],
            tracks[0].events.iter().map(|(&t, &c)| (t, c)).collect::<Vec<_>>()
        );
        assert_eq!(Some(2), tracks[1].at(3));
        Ok(())
    }
}
