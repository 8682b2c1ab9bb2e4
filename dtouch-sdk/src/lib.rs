mod error;
mod publisher;
mod retry;
mod types;
mod value;
mod wire;

pub type DriverResult<T> = Result<T, DriverError>;
pub type PublishResult<T> = Result<T, PublishError>;

pub use error::{DriverError, PublishError};
pub use publisher::Publisher;
pub use retry::{build_exponential_backoff, RetryPolicy};
pub use types::{ConnectionState, DriverHealth, HealthStatus};
pub use value::PublishedValue;
pub use wire::{WireDecode, WireEncode};
