pub mod codec;
pub mod error;
pub mod frame;
pub mod session;

// Re-export common types
pub use codec::{decode_frame, decode_response, encode_request, DTouchFrameCodec};
pub use error::{DecodeError, ProtocolError};
pub use frame::defs::{ChannelKind, Command, Register, RegisterValue, Slot};
pub use frame::{RegisterBatch, RequestFrame, ResponseFrame};
pub use session::{DTouchSession, DTouchSessionImpl};
