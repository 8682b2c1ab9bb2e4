use config::ConfigError;
use dtouch_driver::ConfigError as DeviceConfigError;
use dtouch_sdk::DriverError;
use std::io::Error as IoError;
use thiserror::Error;
use tokio::task::JoinError;

pub type AppResult<T, E = AppError> = anyhow::Result<T, E>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Settings(#[from] ConfigError),
    #[error("Invalid device configuration: {0}")]
    Device(#[from] DeviceConfigError),
    #[error("{0}")]
    Driver(#[from] DriverError),
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    Msg(String),
}

impl From<&str> for AppError {
    #[inline]
    fn from(msg: &str) -> Self {
        Self::Msg(msg.to_string())
    }
}

impl From<String> for AppError {
    #[inline]
    fn from(msg: String) -> Self {
        Self::Msg(msg)
    }
}
