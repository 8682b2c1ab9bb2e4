use crate::protocol::{
    error::DecodeError,
    frame::{
        declared_len,
        defs::{Command, HEADER_LEN, HEADER_MARKER, MAX_RESPONSE_LEN},
        DTouchCodecContext, RegisterBatch, RequestFrame, ResponseFrame,
    },
};
use bytes::{Buf, Bytes, BytesMut};
use dtouch_sdk::WireDecode;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Encode the request frame for `command` addressed to `address`.
pub fn encode_request(address: u8, command: Command) -> Bytes {
    Bytes::copy_from_slice(&RequestFrame::new(address, command).encode())
}

/// Validate a complete response frame without interpreting its payload.
pub fn decode_frame(bytes: &Bytes, expected_address: u8) -> Result<ResponseFrame, DecodeError> {
    let ctx = DTouchCodecContext::default().with_address(expected_address);
    let (rest, frame) = ResponseFrame::parse(bytes, bytes, &ctx)?;
    if !rest.is_empty() {
        return Err(DecodeError::Malformed(format!(
            "{} trailing bytes after frame",
            rest.len()
        )));
    }
    Ok(frame)
}

/// Validate a complete response to `command` and decode its registers.
pub fn decode_response(
    bytes: &Bytes,
    expected_address: u8,
    command: Command,
) -> Result<RegisterBatch, DecodeError> {
    let frame = decode_frame(bytes, expected_address)?;
    RegisterBatch::decode(command, &frame.payload)
}

/// Total length a buffered partial frame is waiting for.
pub fn expected_len(partial: &[u8]) -> usize {
    declared_len(partial).unwrap_or(HEADER_LEN)
}

/// Stream framer for one bus address.
///
/// The decoder only delimits frames: it synchronises on `[address][0x80]`,
/// waits for the declared length and yields the raw bytes. Checksum and
/// payload validation happen in [`decode_response`] so that a corrupted frame
/// surfaces as a `DecodeError` instead of being skipped silently. Replies
/// from other addresses sharing the bus are discarded here.
#[derive(Debug, Clone)]
pub struct DTouchFrameCodec {
    address: u8,
}

impl DTouchFrameCodec {
    pub fn new(address: u8) -> Self {
        Self { address }
    }
}

impl Decoder for DTouchFrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut i = 0;
        while i < src.len() {
            if src[i] != self.address {
                i += 1;
                continue;
            }
            if i + 1 < src.len() && src[i + 1] != HEADER_MARKER {
                i += 1;
                continue;
            }

            let Some(total) = declared_len(&src[i..]) else {
                // Wait for the rest of the header.
                src.advance(i);
                return Ok(None);
            };

            if total > MAX_RESPONSE_LEN {
                tracing::warn!(
                    address = self.address,
                    declared = total,
                    "Packet too long for receive buffer, resynchronising"
                );
                i += 1;
                continue;
            }

            if i + total > src.len() {
                src.advance(i);
                src.reserve(total - src.len());
                return Ok(None);
            }

            if i > 0 {
                tracing::trace!(skipped = i, "Discarded bytes before frame");
            }
            src.advance(i);
            return Ok(Some(src.split_to(total).freeze()));
        }

        src.clear();
        Ok(None)
    }
}

impl Encoder<RequestFrame> for DTouchFrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: RequestFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}
