mod tlv;

pub use tlv::{Tlv, TypeTag, HEADER_SIZE, TLV_VERSION};

use ppseq_core::defined::INDEX_CHUNK_LEN;

use crate::{
    compiler::{CompiledSequence, TrackKind},
    error::{CompileError, PacketError},
};

/// Encodes a compiled scan point into a packet.
///
/// The packet starts with its index, followed by one block per tick.
/// Each block holds the writes, increments and reports of the tick and ends with an interrupt record.
/// The block of tick 0 additionally starts with the tick count and the descriptor.
/// A phase matching period of zero is taken as one.
pub fn encode(compiled: &CompiledSequence, phase_matching_period: u32) -> Result<Vec<u8>, CompileError> {
    let period = compiled.period;
    let pmp = u8::try_from(phase_matching_period.max(1))
        .map_err(|_| CompileError::PhaseMatchingPeriod(phase_matching_period))?;

    let mut ticks = vec![Vec::new(); period];
    [TrackKind::Write, TrackKind::Increment, TrackKind::Report]
        .into_iter()
        .for_each(|kind| {
            compiled
                .tracks
                .iter()
                .filter(|track| track.kind == kind && !track.register.is_dummy())
                .for_each(|track| {
                    track
                        .events
                        .range(..period)
                        .for_each(|(&tick, &count)| ticks[tick].push(track.record(count)));
                })
        });

    let blocks = ticks
        .into_iter()
        .enumerate()
        .map(|(t, records)| {
            let mut block = Vec::new();
            if t == 0 {
                Tlv::InterruptCount(period as u32).write_to(&mut block);
                Tlv::Descriptor(compiled.descriptor.text.clone()).write_to(&mut block);
            }
            records.iter().for_each(|r| r.write_to(&mut block));
            Tlv::Interrupt {
                interrupt_count: ((t + 1) % pmp as usize) as u8,
                period: pmp,
            }
            .write_to(&mut block);
            block
        })
        .collect::<Vec<_>>();

    let index_size = period.div_ceil(INDEX_CHUNK_LEN) * HEADER_SIZE + period * size_of::<u32>();
    let offsets = blocks
        .iter()
        .scan(index_size, |offset, block| {
            let start = *offset;
            *offset += block.len();
            Some(start as u32)
        })
        .collect::<Vec<_>>();

    let mut packet = Vec::with_capacity(index_size + blocks.iter().map(Vec::len).sum::<usize>());
    offsets
        .chunks(INDEX_CHUNK_LEN)
        .for_each(|chunk| Tlv::Index(chunk.to_vec()).write_to(&mut packet));
    blocks.iter().for_each(|block| packet.extend_from_slice(block));
    Ok(packet)
}

/// Iterates over the records of a packet together with their byte offsets.
///
/// Iteration stops after the first error.
#[derive(Clone, Debug)]
pub struct TlvIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> TlvIter<'a> {
    /// Creates a new [`TlvIter`] over the records from `offset` to the end of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            offset,
            failed: false,
        }
    }
}

impl Iterator for TlvIter<'_> {
    type Item = Result<(usize, Tlv), PacketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        match Tlv::parse(self.data, self.offset) {
            Ok((tlv, size)) => {
                let offset = self.offset;
                self.offset += size;
                Some(Ok((offset, tlv)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// A validated packet.
#[derive(Clone, Debug, PartialEq)]
pub struct PacketView<'a> {
    data: &'a [u8],
    index: Vec<usize>,
}

impl<'a> PacketView<'a> {
    /// Parses and validates a packet.
    ///
    /// Every record must be well formed, the packet must start with its index,
    /// and every index entry must point at a record boundary.
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        let records = TlvIter::new(data, 0).collect::<Result<Vec<_>, _>>()?;
        let index = records
            .iter()
            .map_while(|(_, tlv)| match tlv {
                Tlv::Index(offsets) => Some(offsets),
                _ => None,
            })
            .flatten()
            .map(|&o| o as usize)
            .collect::<Vec<_>>();
        if index.is_empty() {
            return Err(PacketError::MissingIndex);
        }
        index.iter().enumerate().try_for_each(|(tick, &offset)| {
            let aligned = records.binary_search_by_key(&offset, |(o, _)| *o).is_ok();
            let ordered = tick == 0 || index[tick - 1] < offset;
            if aligned && ordered {
                Ok(())
            } else {
                Err(PacketError::InvalidIndex { tick, offset })
            }
        })?;
        Ok(Self { data, index })
    }

    /// The number of ticks.
    #[must_use]
    pub fn period(&self) -> usize {
        self.index.len()
    }

    /// Byte offsets of the ticks.
    #[must_use]
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// The size of the packet in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a packet without bytes, which cannot be parsed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The records of `tick`, up to and including its interrupt.
    pub fn tick(&self, tick: usize) -> Result<Vec<Tlv>, PacketError> {
        let start = *self.index.get(tick).ok_or(PacketError::TickOutOfRange {
            tick,
            period: self.period(),
        })?;
        let end = self.index.get(tick + 1).copied().unwrap_or(self.data.len());
        TlvIter::new(&self.data[..end], start)
            .map(|r| r.map(|(_, tlv)| tlv))
            .collect()
    }

    /// Iterates over the records of every tick.
    pub fn ticks(&self) -> impl Iterator<Item = Result<Vec<Tlv>, PacketError>> + '_ {
        (0..self.period()).map(|t| self.tick(t))
    }

    /// The descriptor the packet was generated from.
    #[must_use]
    pub fn descriptor(&self) -> Option<String> {
        self.tick(0).ok()?.into_iter().find_map(|tlv| match tlv {
            Tlv::Descriptor(text) => Some(text),
            _ => None,
        })
    }
}

/// Parses a packet into its ticks.
pub fn decode(data: &[u8]) -> Result<Vec<Vec<Tlv>>, PacketError> {
    PacketView::parse(data)?.ticks().collect()
}
