use crate::protocol::error::DecodeError;
use bytes::{BufMut, Bytes};
use crc::{Crc, CRC_16_MODBUS};
use dtouch_sdk::{WireDecode, WireEncode};

pub mod body;
pub mod defs;

pub use body::RegisterBatch;
use defs::{
    Command, CRC_LEN, HEADER_LEN, HEADER_MARKER, MAX_RESPONSE_LEN, MIN_FRAME_LEN,
    REQUEST_STATIC_HEADER,
};

/// CRC-16/MODBUS, transmitted low byte first.
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Context for codec operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DTouchCodecContext {
    /// Address the frame must carry; `None` accepts any address.
    pub address: Option<u8>,
}

impl DTouchCodecContext {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = Some(address);
        self
    }
}

/// Master request: `[addr][80 00 00][len u16][opcode][page][crc lo][crc hi]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    pub address: u8,
    pub command: Command,
}

impl RequestFrame {
    /// Opcode plus page byte.
    const PAYLOAD_LEN: usize = 2;
    pub const LEN: usize = MIN_FRAME_LEN + Self::PAYLOAD_LEN;

    pub fn new(address: u8, command: Command) -> Self {
        Self { address, command }
    }

    /// The complete frame, checksum included.
    pub fn encode(&self) -> [u8; Self::LEN] {
        let body_len = Self::LEN - CRC_LEN;
        let mut frame = [0u8; Self::LEN];
        frame[0] = self.address;
        frame[1..4].copy_from_slice(&REQUEST_STATIC_HEADER);
        frame[4..6].copy_from_slice(&(Self::PAYLOAD_LEN as u16).to_be_bytes());
        frame[6] = self.command.opcode();
        frame[7] = self.command.page();
        let crc = CRC16.checksum(&frame[..body_len]);
        frame[body_len..].copy_from_slice(&crc.to_le_bytes());
        frame
    }
}

impl WireEncode for RequestFrame {
    type Error = DecodeError;
    type Context = DTouchCodecContext;

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        Self::LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<(), Self::Error> {
        dst.put_slice(&self.encode());
        Ok(())
    }
}

impl WireDecode for RequestFrame {
    type Error = DecodeError;
    type Context = DTouchCodecContext;

    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self), Self::Error> {
        let (rest, address, payload) = split_frame(input, ctx)?;
        if input[1..4] != REQUEST_STATIC_HEADER {
            return Err(DecodeError::Malformed("invalid request header".into()));
        }
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(DecodeError::Malformed(format!(
                "request payload must be {} bytes, got {}",
                Self::PAYLOAD_LEN,
                payload.len()
            )));
        }
        let command = Command::from_parts(payload[0], payload[1]).ok_or_else(|| {
            DecodeError::Malformed(format!(
                "unknown command {:#04X}/{:#04X}",
                payload[0], payload[1]
            ))
        })?;
        Ok((rest, Self { address, command }))
    }
}

/// Controller response: `[addr][80][x][x][len u16][payload][crc lo][crc hi]`.
///
/// The response does not echo the opcode; the payload layout is chosen by the
/// command in flight (see [`RegisterBatch::decode`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub address: u8,
    pub payload: Bytes,
}

impl ResponseFrame {
    pub fn new(address: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            address,
            payload: payload.into(),
        }
    }
}

impl WireEncode for ResponseFrame {
    type Error = DecodeError;
    type Context = DTouchCodecContext;

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        MIN_FRAME_LEN + self.payload.len()
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, ctx: &Self::Context) -> Result<(), Self::Error> {
        let total = self.encoded_len(ctx);
        if total > MAX_RESPONSE_LEN {
            return Err(DecodeError::Malformed(format!(
                "response of {total} bytes exceeds {MAX_RESPONSE_LEN}"
            )));
        }
        let mut digest = CRC16.digest();
        let header = [
            self.address,
            HEADER_MARKER,
            0x00,
            0x00,
            (self.payload.len() >> 8) as u8,
            self.payload.len() as u8,
        ];
        digest.update(&header);
        digest.update(&self.payload);

        dst.put_slice(&header);
        dst.put_slice(&self.payload);
        dst.put_u16_le(digest.finalize());
        Ok(())
    }
}

impl WireDecode for ResponseFrame {
    type Error = DecodeError;
    type Context = DTouchCodecContext;

    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self), Self::Error> {
        let (rest, address, payload) = split_frame(input, ctx)?;
        // Borrow from the parent buffer when the input is a view into it.
        let payload = if !parent.is_empty() && within(parent, payload) {
            parent.slice_ref(payload)
        } else {
            Bytes::copy_from_slice(payload)
        };
        Ok((rest, Self { address, payload }))
    }
}

fn within(parent: &Bytes, slice: &[u8]) -> bool {
    let start = parent.as_ptr() as usize;
    let end = start + parent.len();
    let s = slice.as_ptr() as usize;
    s >= start && s + slice.len() <= end
}

/// Declared total frame length from a header, if enough bytes are present.
pub fn declared_len(input: &[u8]) -> Option<usize> {
    if input.len() < HEADER_LEN {
        return None;
    }
    Some(u16::from_be_bytes([input[4], input[5]]) as usize + MIN_FRAME_LEN)
}

/// Validate framing, checksum and address; return `(rest, address, payload)`.
///
/// Checks run in a fixed order: length, structure, checksum, address. A frame
/// whose checksum was corrupted is therefore always `ChecksumFailed`.
fn split_frame<'a>(
    input: &'a [u8],
    ctx: &DTouchCodecContext,
) -> Result<(&'a [u8], u8, &'a [u8]), DecodeError> {
    let Some(total) = declared_len(input) else {
        return Err(DecodeError::Truncated {
            expected: MIN_FRAME_LEN,
            actual: input.len(),
        });
    };
    if input.len() < total {
        return Err(DecodeError::Truncated {
            expected: total,
            actual: input.len(),
        });
    }
    if input[1] != HEADER_MARKER {
        return Err(DecodeError::Malformed(format!(
            "header marker {:#04X}, expected {HEADER_MARKER:#04X}",
            input[1]
        )));
    }
    if total > MAX_RESPONSE_LEN {
        return Err(DecodeError::Malformed(format!(
            "declared length {total} exceeds {MAX_RESPONSE_LEN}"
        )));
    }

    let body_end = total - CRC_LEN;
    let calculated = CRC16.checksum(&input[..body_end]);
    let expected = u16::from_le_bytes([input[body_end], input[body_end + 1]]);
    if expected != calculated {
        return Err(DecodeError::ChecksumFailed {
            expected,
            calculated,
        });
    }

    let address = input[0];
    if let Some(want) = ctx.address {
        if address != want {
            return Err(DecodeError::AddressMismatch {
                expected: want,
                actual: address,
            });
        }
    }

    Ok((&input[total..], address, &input[HEADER_LEN..body_end]))
}
