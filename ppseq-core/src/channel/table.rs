use derive_more::Deref;

use super::{Channel, ChannelError};
use crate::defined::NUM_CHANNELS;

/// The configuration of all channels of a device.
#[derive(Clone, Debug, PartialEq, Deref)]
pub struct ChannelTable {
    channels: Vec<Channel>,
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self {
            channels: (1..=NUM_CHANNELS)
                .map(Channel::unchecked)
                .collect(),
        }
    }
}

impl ChannelTable {
    /// Parameter key of the configuration string of channel `number`.
    #[must_use]
    pub fn parameter_key(number: usize) -> String {
        format!("ch{number}")
    }

    /// Creates a table from the configured channels. Unlisted channels keep their defaults.
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Self {
        let mut table = Self::default();
        channels.into_iter().for_each(|ch| table.set(ch));
        table
    }

    /// Replaces the configuration of a channel.
    pub fn set(&mut self, channel: Channel) {
        let i = channel.number() - 1;
        self.channels[i] = channel;
    }

    /// Returns channel `number`.
    pub fn channel(&self, number: usize) -> Result<&Channel, ChannelError> {
        number
            .checked_sub(1)
            .and_then(|i| self.channels.get(i))
            .ok_or(ChannelError::InvalidNumber(number))
    }

    /// Channels taking part in piano-player sequencing.
    pub fn pp_enabled(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|ch| ch.pp_enabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Special;

    #[test]
    fn default() {
        let table = ChannelTable::default();
        assert_eq!(NUM_CHANNELS, table.len());
        assert!(table.iter().enumerate().all(|(i, ch)| ch.number() == i + 1));
        assert_eq!(0, table.pp_enabled().count());
    }

    #[test]
    fn set() -> anyhow::Result<()> {
        let table = ChannelTable::new([Channel::new(5)?
            .with_pp_enabled(true)
            .with_special(Special::Trans)]);
        assert_eq!(Special::Trans, table.channel(5)?.special());
        assert_eq!(vec![5], table.pp_enabled().map(|c| c.number()).collect::<Vec<_>>());
        assert_eq!(Err(ChannelError::InvalidNumber(0)), table.channel(0));
        assert_eq!(Err(ChannelError::InvalidNumber(25)), table.channel(25));
        Ok(())
    }

    #[test]
    fn parameter_key() {
        assert_eq!("ch12", ChannelTable::parameter_key(12));
    }
}
