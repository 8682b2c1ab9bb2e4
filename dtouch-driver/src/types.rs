use crate::protocol::ChannelKind;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

// --- Connection ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr, Default)]
#[repr(u8)]
pub enum SerialDataBits {
    Five = 5,
    Six = 6,
    Seven = 7,
    #[default]
    Eight = 8,
}

impl From<SerialDataBits> for tokio_serial::DataBits {
    fn from(bits: SerialDataBits) -> Self {
        match bits {
            SerialDataBits::Five => tokio_serial::DataBits::Five,
            SerialDataBits::Six => tokio_serial::DataBits::Six,
            SerialDataBits::Seven => tokio_serial::DataBits::Seven,
            SerialDataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr, Default)]
#[repr(u8)]
pub enum SerialStopBits {
    #[default]
    One = 1,
    Two = 2,
}

impl From<SerialStopBits> for tokio_serial::StopBits {
    fn from(bits: SerialStopBits) -> Self {
        match bits {
            SerialStopBits::One => tokio_serial::StopBits::One,
            SerialStopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// The controller line runs 8E1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    None,
    Odd,
    #[default]
    Even,
}

impl From<SerialParity> for tokio_serial::Parity {
    fn from(parity: SerialParity) -> Self {
        match parity {
            SerialParity::None => tokio_serial::Parity::None,
            SerialParity::Odd => tokio_serial::Parity::Odd,
            SerialParity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Link to the controller: a local UART or a serial-over-TCP bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Connection {
    Serial {
        port: String,
        #[serde(default = "Connection::default_baud_rate")]
        baud_rate: u32,
        #[serde(default)]
        data_bits: SerialDataBits,
        #[serde(default)]
        stop_bits: SerialStopBits,
        #[serde(default)]
        parity: SerialParity,
    },
    Tcp {
        host: String,
        port: u16,
    },
}

impl Connection {
    pub const DEFAULT_BAUD_RATE: u32 = 57_600;

    fn default_baud_rate() -> u32 {
        Self::DEFAULT_BAUD_RATE
    }
}

impl Default for Connection {
    fn default() -> Self {
        Connection::Serial {
            port: "/dev/ttyUSB0".into(),
            baud_rate: Self::DEFAULT_BAUD_RATE,
            data_bits: SerialDataBits::default(),
            stop_bits: SerialStopBits::default(),
            parity: SerialParity::default(),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Serial {
                port,
                baud_rate,
                data_bits,
                stop_bits,
                parity,
            } => write!(
                f,
                "serial {port} {baud_rate} {}{}{}",
                *data_bits as u8,
                match parity {
                    SerialParity::None => 'N',
                    SerialParity::Odd => 'O',
                    SerialParity::Even => 'E',
                },
                *stop_bits as u8
            ),
            Connection::Tcp { host, port } => write!(f, "tcp {host}:{port}"),
        }
    }
}

// --- Device ---

/// Per-channel options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Base entity name; defaults to the channel key.
    pub name: Option<String>,
    pub num_probes: u32,
    pub ideal: bool,
    #[serde(rename = "final")]
    pub final_value: bool,
}

/// Static description of one controller, validated into a
/// [`Device`](crate::device::Device) at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "DeviceConfig::default_address")]
    pub address: u8,
    #[serde(default = "DeviceConfig::default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// Per-command reply window; defaults to 500 ms.
    #[serde(default)]
    pub response_timeout_ms: Option<u64>,
    #[serde(default)]
    pub temperature: Option<ChannelConfig>,
    #[serde(default)]
    pub moisture_content: Option<ChannelConfig>,
    #[serde(default, alias = "equivalent_moisture_content")]
    pub equilibrium_moisture_content: Option<ChannelConfig>,
    #[serde(default)]
    pub heating_level: Option<ChannelConfig>,
    #[serde(default)]
    pub fans_level: Option<ChannelConfig>,
    #[serde(default)]
    pub flaps_level: Option<ChannelConfig>,
    #[serde(default)]
    pub sprayer_level: Option<ChannelConfig>,
}

impl DeviceConfig {
    pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 500;

    fn default_address() -> u8 {
        1
    }

    fn default_update_interval_ms() -> u64 {
        5_000
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelConfig> {
        match kind {
            ChannelKind::Temperature => self.temperature.as_ref(),
            ChannelKind::MoistureContent => self.moisture_content.as_ref(),
            ChannelKind::EquilibriumMoistureContent => self.equilibrium_moisture_content.as_ref(),
            ChannelKind::HeatingLevel => self.heating_level.as_ref(),
            ChannelKind::FansLevel => self.fans_level.as_ref(),
            ChannelKind::FlapsLevel => self.flaps_level.as_ref(),
            ChannelKind::SprayerLevel => self.sprayer_level.as_ref(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            update_interval_ms: Self::default_update_interval_ms(),
            response_timeout_ms: None,
            temperature: None,
            moisture_content: None,
            equilibrium_moisture_content: None,
            heating_level: None,
            fans_level: None,
            flaps_level: None,
            sprayer_level: None,
        }
    }
}
