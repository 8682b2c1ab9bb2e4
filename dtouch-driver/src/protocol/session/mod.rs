use crate::protocol::{
    codec::{expected_len, DTouchFrameCodec},
    error::{DecodeError, ProtocolError},
    frame::{defs::Command, RequestFrame},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::Instant,
};
use tokio_util::codec::Framed;

/// One request/response exchange at a time with a single controller.
///
/// Sending and awaiting the reply are separate steps so the caller can track
/// which phase a command failed in.
#[async_trait]
pub trait DTouchSession: Send + Sync {
    /// Discard any buffered input, then write the request for `command`.
    async fn send_request(&self, command: Command) -> Result<(), ProtocolError>;

    /// Wait up to `timeout` for the next complete frame from this address.
    ///
    /// A timeout with part of a frame already received is reported as
    /// [`DecodeError::Truncated`].
    async fn read_frame(&self, timeout: Duration) -> Result<Bytes, ProtocolError>;

    /// Read and drop everything that arrives until `deadline`.
    ///
    /// Returns the number of complete frames discarded. Bytes of an
    /// unfinished frame are dropped as well.
    async fn discard_until(&self, deadline: Instant) -> Result<usize, ProtocolError>;

    /// Close the underlying transport.
    async fn close(&self) -> Result<(), ProtocolError>;

    async fn request(&self, command: Command, timeout: Duration) -> Result<Bytes, ProtocolError> {
        self.send_request(command).await?;
        self.read_frame(timeout).await
    }
}

/// Generic implementation over any Framed stream.
pub struct DTouchSessionImpl<T> {
    pub framed: tokio::sync::Mutex<Framed<T, DTouchFrameCodec>>,
    pub address: u8,
}

impl<T> DTouchSessionImpl<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    pub fn new(io: T, address: u8) -> Self {
        Self {
            framed: tokio::sync::Mutex::new(Framed::new(io, DTouchFrameCodec::new(address))),
            address,
        }
    }
}

/// Drop replies that arrived after their request timed out, plus any noise.
async fn discard_pending<T>(framed: &mut Framed<T, DTouchFrameCodec>) -> (usize, usize)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut frames = 0;
    while let Ok(Some(Ok(_))) = tokio::time::timeout(Duration::ZERO, framed.next()).await {
        frames += 1;
    }
    let bytes = framed.read_buffer().len();
    framed.read_buffer_mut().clear();
    (frames, bytes)
}

#[async_trait]
impl<T> DTouchSession for DTouchSessionImpl<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn send_request(&self, command: Command) -> Result<(), ProtocolError> {
        let mut framed = self.framed.lock().await;

        let (frames, bytes) = discard_pending(&mut *framed).await;
        if frames > 0 || bytes > 0 {
            tracing::warn!(
                address = self.address,
                %command,
                frames,
                bytes,
                "Discarded unsolicited input before request"
            );
        }

        framed
            .send(RequestFrame::new(self.address, command))
            .await
            .map_err(ProtocolError::Io)
    }

    async fn read_frame(&self, timeout: Duration) -> Result<Bytes, ProtocolError> {
        let mut framed = self.framed.lock().await;
        match tokio::time::timeout(timeout, framed.next()).await {
            Ok(Some(Ok(frame))) => Ok(frame),
            Ok(Some(Err(e))) => Err(ProtocolError::Io(e)),
            Ok(None) => Err(ProtocolError::Transport("Connection closed".into())),
            Err(_) => {
                let partial = framed.read_buffer();
                if partial.is_empty() {
                    Err(ProtocolError::Timeout(timeout))
                } else {
                    Err(DecodeError::Truncated {
                        expected: expected_len(partial),
                        actual: partial.len(),
                    }
                    .into())
                }
            }
        }
    }

    async fn discard_until(&self, deadline: Instant) -> Result<usize, ProtocolError> {
        let mut framed = self.framed.lock().await;
        let mut frames = 0;
        let result = loop {
            match tokio::time::timeout_at(deadline, framed.next()).await {
                Ok(Some(Ok(_))) => frames += 1,
                Ok(Some(Err(e))) => break Err(ProtocolError::Io(e)),
                Ok(None) => break Err(ProtocolError::Transport("Connection closed".into())),
                Err(_) => break Ok(frames),
            }
        };
        framed.read_buffer_mut().clear();
        result
    }

    async fn close(&self) -> Result<(), ProtocolError> {
        let mut framed = self.framed.lock().await;
        SinkExt::<RequestFrame>::close(&mut *framed)
            .await
            .map_err(ProtocolError::Io)
    }
}
