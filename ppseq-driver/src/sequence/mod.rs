mod alias;
mod params;

pub use alias::{canonical_name, Mode, ALIASES, BIT_FIELDS, BIT_KEYS, MODES};
pub use params::SequenceParameters;

use crate::{dsl::try_parse_records, error::ParseError};

/// Parses a line of the sequence language into normalized scan points.
pub fn try_parse_sequences(input: &str) -> Result<Vec<SequenceParameters>, ParseError> {
    try_parse_records(input)?
        .iter()
        .map(SequenceParameters::from_record)
        .collect()
}

/// Parses a line of the sequence language into normalized scan points.
///
/// A line that fails to parse is logged and yields no scan points.
pub fn parse_sequences(input: &str) -> Vec<SequenceParameters> {
    try_parse_sequences(input).unwrap_or_else(|e| {
        tracing::error!("Cannot parse sequences {:?}: {}", input, e);
        Vec::new()
    })
}

/// The scan points of a queue.
///
/// Queues repeat, so the scan point following the last one is the first one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sequences {
    items: Vec<SequenceParameters>,
}

impl Sequences {
    /// Creates a new [`Sequences`].
    #[must_use]
    pub const fn new(items: Vec<SequenceParameters>) -> Self {
        Self { items }
    }

    /// Parses a line of the sequence language. See [`parse_sequences`].
    #[must_use]
    pub fn parse(input: &str) -> Self {
        Self::new(parse_sequences(input))
    }

    /// Parses a line of the sequence language. See [`try_parse_sequences`].
    pub fn try_parse(input: &str) -> Result<Self, ParseError> {
        try_parse_sequences(input).map(Self::new)
    }

    /// Marks every scan point as part of an acquisition or not.
    #[must_use]
    pub fn with_acquiring(mut self, acquiring: bool) -> Self {
        self.items.iter_mut().for_each(|p| p.acquiring = acquiring);
        self
    }

    /// The number of scan points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no scan points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The parameters of all scan points.
    #[must_use]
    pub fn parameters(&self) -> &[SequenceParameters] {
        &self.items
    }

    /// The scan point at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Sequence<'_>> {
        (index < self.items.len()).then_some(Sequence {
            collection: self,
            index,
        })
    }

    /// Iterates over the scan points.
    pub fn iter(&self) -> impl Iterator<Item = Sequence<'_>> {
        (0..self.items.len()).map(move |index| Sequence {
            collection: self,
            index,
        })
    }
}

/// A scan point together with its queue.
#[derive(Clone, Copy, Debug)]
pub struct Sequence<'a> {
    collection: &'a Sequences,
    index: usize,
}

impl std::ops::Deref for Sequence<'_> {
    type Target = SequenceParameters;

    fn deref(&self) -> &Self::Target {
        &self.collection.items[self.index]
    }
}

impl<'a> Sequence<'a> {
    /// The position in the queue.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The parameters of this scan point.
    #[must_use]
    pub fn parameters(&self) -> &'a SequenceParameters {
        &self.collection.items[self.index]
    }

    /// The scan point executed next. The last scan point is followed by the first.
    #[must_use]
    pub fn following(&self) -> Sequence<'a> {
        Sequence {
            collection: self.collection,
            index: (self.index + 1) % self.collection.items.len(),
        }
    }

    /// The scan point executed before, or `None` for the first one.
    #[must_use]
    pub fn preceding(&self) -> Option<Sequence<'a>> {
        self.index.checked_sub(1).map(|index| Sequence {
            collection: self.collection,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours() -> anyhow::Result<()> {
        let sequences = Sequences::try_parse("1ms, 2ms, 3ms")?;
        assert_eq!(3, sequences.len());
        let first = sequences.get(0).unwrap();
        assert_eq!(2e-3, first.following().delay);
        assert!(first.preceding().is_none());
        let last = sequences.get(2).unwrap();
        assert_eq!(1e-3, last.following().delay);
        assert_eq!(2e-3, last.preceding().unwrap().delay);
        assert!(sequences.get(3).is_none());
        Ok(())
    }

    #[test]
    fn parse_failure_is_empty() {
        assert!(Sequences::parse("delay=[1, 2], laser=[1, 2, 3]").is_empty());
        assert!(Sequences::try_parse("delay=[1, 2], laser=[1, 2, 3]").is_err());
    }

    #[test]
    fn acquiring() -> anyhow::Result<()> {
        let sequences = Sequences::try_parse("delay=[1ms, 2ms]")?.with_acquiring(true);
        assert!(sequences.iter().all(|s| s.acquiring && s.increments_image_number()));
        Ok(())
    }

    #[test]
    fn log_series_interleaved() -> anyhow::Result<()> {
        let sequences = Sequences::try_parse("interleave(-10us, log_series(1ms, 178ms, steps_per_decade=4))")?;
        assert_eq!(21, sequences.len());
        assert!(sequences.iter().all(|s| s.laser_on));
        Ok(())
    }
}
