//! Polling driver for the Logica dTouch kiln controller.
//!
//! The controller is polled over a serial line (or a serial-over-TCP bridge)
//! with a fixed sequence of page requests; each completed cycle is mapped onto
//! named entities and handed to a [`dtouch_sdk::Publisher`].

pub mod aggregator;
pub mod device;
pub mod driver;
pub mod protocol;
pub mod scheduler;
pub mod supervisor;
pub mod types;

pub use aggregator::aggregate;
pub use device::{entity_name, Channel, ConfigError, Device, Entity, EntityId};
pub use driver::{DTouchDriver, DriverStats};
pub use scheduler::{CommandOutcome, CommandPhase, CycleError, CycleReport, Scheduler};
pub use supervisor::DTouchSupervisor;
pub use types::{ChannelConfig, Connection, DeviceConfig};
