use crate::{PublishResult, PublishedValue};
use std::{fmt::Debug, sync::Arc};

/// Publisher interface used by drivers to hand finalized values to observers.
///
/// Implementations must be non-blocking: the driver calls `try_publish` for a
/// whole cycle's batch without yielding in between, so back pressure has to be
/// reported as an error instead of awaited.
pub trait Publisher: Send + Sync + Debug {
    /// Try to publish a single value without blocking.
    fn try_publish(&self, value: Arc<PublishedValue>) -> PublishResult<()>;
}
