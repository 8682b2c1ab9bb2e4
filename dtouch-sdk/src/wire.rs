use bytes::{BufMut, Bytes};

/// Serialize a frame into a caller-provided buffer.
///
/// `encoded_len` must be exact: codecs reserve it up front so a request goes
/// out in a single write, and checksums are appended after the body.
pub trait WireEncode {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    /// Per-link parameters, such as the bus address a frame must carry.
    type Context;

    fn encoded_len(&self, ctx: &Self::Context) -> usize;
    fn encode_to<B: BufMut>(&self, dst: &mut B, ctx: &Self::Context) -> Result<(), Self::Error>;
}

/// Parse a frame out of a received buffer.
pub trait WireDecode: Sized {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    type Context;

    /// Parse one frame from the front of `input` and return the unread tail.
    ///
    /// When `input` is a view into `parent`, payload fields are taken with
    /// `Bytes::slice_ref` instead of copied, so a response payload stays
    /// shared with the frame the stream codec yielded. Pass an empty `parent`
    /// to force copies.
    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self), Self::Error>;
}
