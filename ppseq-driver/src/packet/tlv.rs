use ppseq_core::register::Register;
use zerocopy::{
    byteorder::{BigEndian, U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

use crate::error::PacketError;

/// Version of the record format.
pub const TLV_VERSION: u8 = 1;

/// Type of a packet record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
#[non_exhaustive]
pub enum TypeTag {
    /// Ends a tick
    Interrupt = 0,
    /// Writes a register
    Write = 1,
    /// Adds to a register
    Increment = 2,
    /// Descriptor text
    Descriptor = 3,
    /// Diagnostic text
    Output = 4,
    /// Total packet size
    SequenceLength = 5,
    /// Total number of ticks
    InterruptCount = 6,
    /// Reports a register value
    Report = 7,
    /// Byte offsets of the ticks
    Index = 8,
}

impl TryFrom<u8> for TypeTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => TypeTag::Interrupt,
            1 => TypeTag::Write,
            2 => TypeTag::Increment,
            3 => TypeTag::Descriptor,
            4 => TypeTag::Output,
            5 => TypeTag::SequenceLength,
            6 => TypeTag::InterruptCount,
            7 => TypeTag::Report,
            8 => TypeTag::Index,
            v => return Err(v),
        })
    }
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
pub(crate) struct Header {
    pub(crate) ty: u8,
    pub(crate) version: u8,
    pub(crate) length: U16<BigEndian>,
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
struct InterruptPayload {
    interrupt_count: u8,
    period: u8,
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
struct RegisterPayload {
    address: U32<BigEndian>,
    bitmask: U32<BigEndian>,
    value: U32<BigEndian>,
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
struct ReportHead {
    address: U32<BigEndian>,
    bitmask: U32<BigEndian>,
}

fn floor_char_boundary(s: &str, len: usize) -> usize {
    (0..=len.min(s.len()))
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0)
}

/// The size of a record header in bytes.
pub const HEADER_SIZE: usize = size_of::<Header>();

/// A packet record.
#[derive(Clone, Debug, PartialEq)]
pub enum Tlv {
    /// Ends a tick. The device waits for the next clock tick.
    Interrupt {
        /// Value of the interrupt counter after this tick
        interrupt_count: u8,
        /// Wrap of the interrupt counter
        period: u8,
    },
    /// Replaces the bits of `bitmask` at `address` with `value`.
    Write {
        /// Word address
        address: u32,
        /// Register bits
        bitmask: u32,
        /// New register bits
        value: u32,
    },
    /// Adds `value` to the bits of `bitmask` at `address`.
    Increment {
        /// Word address
        address: u32,
        /// Register bits
        bitmask: u32,
        /// Amount, shifted into the register bits
        value: u32,
    },
    /// The descriptor the packet was generated from.
    Descriptor(String),
    /// Diagnostic text.
    Output(String),
    /// Total size of the packet in bytes.
    SequenceLength(u32),
    /// Total number of ticks of the packet.
    InterruptCount(u32),
    /// Reports the bits of `bitmask` at `address` under `name`.
    Report {
        /// Word address
        address: u32,
        /// Register bits
        bitmask: u32,
        /// Register name
        name: String,
    },
    /// Byte offsets of ticks from the start of the packet.
    Index(Vec<u32>),
}

impl Tlv {
    /// A write of `count` to `register`.
    #[must_use]
    pub fn write(register: &Register, count: u64) -> Self {
        Tlv::Write {
            address: register.address(),
            bitmask: register.bitmask(),
            value: register.wire_value(count),
        }
    }

    /// An increment of `register` by `count`.
    #[must_use]
    pub fn increment(register: &Register, count: u64) -> Self {
        Tlv::Increment {
            address: register.address(),
            bitmask: register.bitmask(),
            value: register.wire_value(count),
        }
    }

    /// A report of `register`.
    #[must_use]
    pub fn report(register: &Register) -> Self {
        Tlv::Report {
            address: register.address(),
            bitmask: register.bitmask(),
            name: register.name().clone(),
        }
    }

    /// The type of the record.
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        match self {
            Tlv::Interrupt { .. } => TypeTag::Interrupt,
            Tlv::Write { .. } => TypeTag::Write,
            Tlv::Increment { .. } => TypeTag::Increment,
            Tlv::Descriptor(_) => TypeTag::Descriptor,
            Tlv::Output(_) => TypeTag::Output,
            Tlv::SequenceLength(_) => TypeTag::SequenceLength,
            Tlv::InterruptCount(_) => TypeTag::InterruptCount,
            Tlv::Report { .. } => TypeTag::Report,
            Tlv::Index(_) => TypeTag::Index,
        }
    }

    fn payload_size(&self) -> usize {
        match self {
            Tlv::Interrupt { .. } => size_of::<InterruptPayload>(),
            Tlv::Write { .. } | Tlv::Increment { .. } => size_of::<RegisterPayload>(),
            Tlv::Descriptor(s) | Tlv::Output(s) => s.len(),
            Tlv::SequenceLength(_) | Tlv::InterruptCount(_) => size_of::<u32>(),
            Tlv::Report { name, .. } => size_of::<ReportHead>() + name.len(),
            Tlv::Index(offsets) => size_of::<u32>() * offsets.len(),
        }
    }

    /// The size of the record including its header.
    #[must_use]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload_size()
    }

    /// Appends the record to `buf`.
    ///
    /// Text longer than a record can hold is truncated at a character boundary with a warning.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        let max_payload = u16::MAX as usize - HEADER_SIZE;
        let payload_size = if self.payload_size() > max_payload {
            tracing::warn!(
                "{:?} record of {} bytes does not fit in a packet record, truncated",
                self.tag(),
                self.size()
            );
            match self {
                Tlv::Descriptor(s) | Tlv::Output(s) => floor_char_boundary(s, max_payload),
                Tlv::Report { name, .. } => {
                    let head = size_of::<ReportHead>();
                    head + floor_char_boundary(name, max_payload - head)
                }
                _ => max_payload,
            }
        } else {
            self.payload_size()
        };
        let start = buf.len();
        buf.extend_from_slice(
            Header {
                ty: self.tag() as u8,
                version: TLV_VERSION,
                length: U16::new((HEADER_SIZE + payload_size) as u16),
            }
            .as_bytes(),
        );
        match self {
            Tlv::Interrupt {
                interrupt_count,
                period,
            } => buf.extend_from_slice(
                InterruptPayload {
                    interrupt_count: *interrupt_count,
                    period: *period,
                }
                .as_bytes(),
            ),
            Tlv::Write {
                address,
                bitmask,
                value,
            }
            | Tlv::Increment {
                address,
                bitmask,
                value,
            } => buf.extend_from_slice(
                RegisterPayload {
                    address: U32::new(*address),
                    bitmask: U32::new(*bitmask),
                    value: U32::new(*value),
                }
                .as_bytes(),
            ),
            Tlv::Descriptor(s) | Tlv::Output(s) => buf.extend_from_slice(s.as_bytes()),
            Tlv::SequenceLength(v) | Tlv::InterruptCount(v) => {
                buf.extend_from_slice(U32::<BigEndian>::new(*v).as_bytes())
            }
            Tlv::Report {
                address,
                bitmask,
                name,
            } => {
                buf.extend_from_slice(
                    ReportHead {
                        address: U32::new(*address),
                        bitmask: U32::new(*bitmask),
                    }
                    .as_bytes(),
                );
                buf.extend_from_slice(name.as_bytes());
            }
            Tlv::Index(offsets) => offsets
                .iter()
                .for_each(|o| buf.extend_from_slice(U32::<BigEndian>::new(*o).as_bytes())),
        }
        buf.truncate(start + HEADER_SIZE + payload_size);
    }

    /// Encodes the record.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        self.write_to(&mut buf);
        buf
    }

    /// Decodes the record starting at `offset` of `data`. Returns the record and its size.
    pub fn parse(data: &[u8], offset: usize) -> Result<(Self, usize), PacketError> {
        let bytes = data.get(offset..).ok_or(PacketError::Truncated(offset))?;
        let (header, _) = Header::read_from_prefix(bytes).map_err(|_| PacketError::Truncated(offset))?;
        let length = header.length.get() as usize;
        if length < HEADER_SIZE || length > bytes.len() {
            return Err(PacketError::InvalidLength { offset, length });
        }
        if header.version != TLV_VERSION {
            return Err(PacketError::UnsupportedVersion {
                offset,
                version: header.version,
            });
        }
        let tag = TypeTag::try_from(header.ty).map_err(|ty| PacketError::UnknownType { offset, ty })?;
        let payload = &bytes[HEADER_SIZE..length];
        let invalid = PacketError::InvalidLength { offset, length };
        let text = |p: &[u8]| {
            String::from_utf8(p.to_vec()).map_err(|_| PacketError::InvalidText(offset))
        };
        let u32s = |p: &[u8]| -> Result<Vec<u32>, PacketError> {
            if p.len() % size_of::<u32>() != 0 {
                return Err(invalid.clone());
            }
            Ok(p.chunks_exact(size_of::<u32>())
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect())
        };
        let tlv = match tag {
            TypeTag::Interrupt => {
                let p = InterruptPayload::read_from_bytes(payload).map_err(|_| invalid.clone())?;
                Tlv::Interrupt {
                    interrupt_count: p.interrupt_count,
                    period: p.period,
                }
            }
            TypeTag::Write | TypeTag::Increment => {
                let p = RegisterPayload::read_from_bytes(payload).map_err(|_| invalid.clone())?;
                let (address, bitmask, value) = (p.address.get(), p.bitmask.get(), p.value.get());
                if tag == TypeTag::Write {
                    Tlv::Write {
                        address,
                        bitmask,
                        value,
                    }
                } else {
                    Tlv::Increment {
                        address,
                        bitmask,
                        value,
                    }
                }
            }
            TypeTag::Descriptor => Tlv::Descriptor(text(payload)?),
            TypeTag::Output => Tlv::Output(text(payload)?),
            TypeTag::SequenceLength | TypeTag::InterruptCount => {
                let v = U32::<BigEndian>::read_from_bytes(payload).map_err(|_| invalid.clone())?.get();
                if tag == TypeTag::SequenceLength {
                    Tlv::SequenceLength(v)
                } else {
                    Tlv::InterruptCount(v)
                }
            }
            TypeTag::Report => {
                let (head, name) = ReportHead::read_from_prefix(payload).map_err(|_| invalid.clone())?;
                Tlv::Report {
                    address: head.address.get(),
                    bitmask: head.bitmask.get(),
                    name: text(name)?,
                }
            }
            TypeTag::Index => Tlv::Index(u32s(payload)?),
        };
        Ok((tlv, length))
    }
}
