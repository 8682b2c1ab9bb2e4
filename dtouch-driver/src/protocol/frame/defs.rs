use serde::{Deserialize, Serialize};
use std::fmt;

/// Second header byte of every frame in both directions.
pub const HEADER_MARKER: u8 = 0x80;
/// Request header bytes following the address.
pub const REQUEST_STATIC_HEADER: [u8; 3] = [HEADER_MARKER, 0x00, 0x00];
/// Address, marker, two unused bytes and the 16-bit payload length.
pub const HEADER_LEN: usize = 6;
pub const CRC_LEN: usize = 2;
/// Header plus checksum; an empty-payload frame.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CRC_LEN;
/// Largest response the controller sends.
pub const MAX_RESPONSE_LEN: usize = 128;
/// Probe registers carry status bits in the upper nibble.
pub const PROBE_VALUE_MASK: u16 = 0x0FFF;
/// Total register, probe count byte.
pub const MEASUREMENT_FIXED_LEN: usize = 3;
/// Most probes a measurement page can carry within [`MAX_RESPONSE_LEN`].
pub const MAX_PROBES: u8 = ((MAX_RESPONSE_LEN - MIN_FRAME_LEN - MEASUREMENT_FIXED_LEN) / 2) as u8;
/// Five u16 registers, one reserved u16, four u8 levels.
pub const CONTROL_VALUES_LEN: usize = 16;

/// Logical measurement kind of a channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Temperature,
    MoistureContent,
    EquilibriumMoistureContent,
    HeatingLevel,
    FansLevel,
    FlapsLevel,
    SprayerLevel,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 7] = [
        ChannelKind::Temperature,
        ChannelKind::MoistureContent,
        ChannelKind::EquilibriumMoistureContent,
        ChannelKind::HeatingLevel,
        ChannelKind::FansLevel,
        ChannelKind::FlapsLevel,
        ChannelKind::SprayerLevel,
    ];

    /// Stable key used in configuration and as the default entity name.
    pub fn key(self) -> &'static str {
        match self {
            ChannelKind::Temperature => "temperature",
            ChannelKind::MoistureContent => "moisture_content",
            ChannelKind::EquilibriumMoistureContent => "equilibrium_moisture_content",
            ChannelKind::HeatingLevel => "heating_level",
            ChannelKind::FansLevel => "fans_level",
            ChannelKind::FlapsLevel => "flaps_level",
            ChannelKind::SprayerLevel => "sprayer_level",
        }
    }

    /// Actuator levels are single-byte percentages without probes or references.
    pub fn is_level(self) -> bool {
        matches!(
            self,
            ChannelKind::HeatingLevel
                | ChannelKind::FansLevel
                | ChannelKind::FlapsLevel
                | ChannelKind::SprayerLevel
        )
    }

    pub fn supports_probes(self) -> bool {
        !self.is_level()
    }

    /// The controller has no ideal moisture-content register.
    pub fn has_ideal(self) -> bool {
        matches!(
            self,
            ChannelKind::Temperature | ChannelKind::EquilibriumMoistureContent
        )
    }

    pub fn has_final(self) -> bool {
        !self.is_level()
    }

    pub fn accuracy_decimals(self) -> u8 {
        if self.is_level() {
            0
        } else {
            1
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            ChannelKind::Temperature => "°C",
            _ => "%",
        }
    }

    /// Convert a raw register into the channel's engineering value.
    ///
    /// Measurements are fixed-point tenths rounded to one decimal place,
    /// levels are integer percentages.
    pub fn scale(self, raw: u16) -> f64 {
        if self.is_level() {
            raw as f64
        } else {
            round_to(raw as f64 / 10.0, self.accuracy_decimals())
        }
    }

    /// Command that refreshes the channel's main value.
    pub fn command(self) -> Command {
        match self {
            ChannelKind::MoistureContent => Command::MoistureContent,
            ChannelKind::EquilibriumMoistureContent => Command::EquilibriumMoistureContent,
            ChannelKind::Temperature => Command::Temperature,
            _ => Command::ControlValues,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn round_to(value: f64, decimals: u8) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// A unit of protocol work: one `P` request selecting a register page.
///
/// Declaration order is the fixed polling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command {
    MoistureContent,
    EquilibriumMoistureContent,
    Temperature,
    ControlValues,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::MoistureContent,
        Command::EquilibriumMoistureContent,
        Command::Temperature,
        Command::ControlValues,
    ];

    /// ASCII `P`, the read-page opcode.
    pub const OPCODE: u8 = 0x50;

    pub fn opcode(self) -> u8 {
        Self::OPCODE
    }

    pub fn page(self) -> u8 {
        match self {
            Command::MoistureContent => 0x00,
            Command::EquilibriumMoistureContent => 0x02,
            Command::Temperature => 0x03,
            Command::ControlValues => 0x10,
        }
    }

    pub fn from_parts(opcode: u8, page: u8) -> Option<Self> {
        if opcode != Self::OPCODE {
            return None;
        }
        Self::ALL.into_iter().find(|c| c.page() == page)
    }

    /// Measurement kind served by a measurement page.
    pub fn measurement(self) -> Option<ChannelKind> {
        match self {
            Command::MoistureContent => Some(ChannelKind::MoistureContent),
            Command::EquilibriumMoistureContent => Some(ChannelKind::EquilibriumMoistureContent),
            Command::Temperature => Some(ChannelKind::Temperature),
            Command::ControlValues => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:02X}", self.page())
    }
}

/// Position of a register within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    /// Total of a measurement page, or the level of an actuator.
    Value,
    /// 1-based probe index.
    Probe(u8),
    Ideal,
    Final,
}

/// Identifies one decoded register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register {
    pub kind: ChannelKind,
    pub slot: Slot,
}

impl Register {
    pub const fn new(kind: ChannelKind, slot: Slot) -> Self {
        Self { kind, slot }
    }

    /// Command whose reply carries this register.
    pub fn command(&self) -> Command {
        match self.slot {
            Slot::Value | Slot::Probe(_) => self.kind.command(),
            Slot::Ideal | Slot::Final => Command::ControlValues,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Slot::Value => write!(f, "{}", self.kind),
            Slot::Probe(k) => write!(f, "{}[probe {k}]", self.kind),
            Slot::Ideal => write!(f, "{}[ideal]", self.kind),
            Slot::Final => write!(f, "{}[final]", self.kind),
        }
    }
}

/// A decoded register: raw wire value plus its scaled value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterValue {
    pub register: Register,
    pub raw: u16,
    pub value: f64,
}

impl RegisterValue {
    pub fn new(register: Register, raw: u16) -> Self {
        Self {
            register,
            raw,
            value: register.kind.scale(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parts_round_trip() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_parts(cmd.opcode(), cmd.page()), Some(cmd));
        }
        assert_eq!(Command::from_parts(b'Q', 0x00), None);
        assert_eq!(Command::from_parts(Command::OPCODE, 0x01), None);
    }

    #[test]
    fn scaling_per_kind() {
        assert_eq!(ChannelKind::Temperature.scale(215), 21.5);
        assert_eq!(ChannelKind::MoistureContent.scale(1234), 123.4);
        assert_eq!(ChannelKind::EquilibriumMoistureContent.scale(0), 0.0);
        assert_eq!(ChannelKind::FansLevel.scale(75), 75.0);
        assert_eq!(ChannelKind::FansLevel.accuracy_decimals(), 0);
        assert_eq!(ChannelKind::Temperature.accuracy_decimals(), 1);
    }

    #[test]
    fn max_probes_fits_response() {
        let longest = MIN_FRAME_LEN + MEASUREMENT_FIXED_LEN + 2 * MAX_PROBES as usize;
        assert!(longest <= MAX_RESPONSE_LEN);
        assert!(longest + 2 > MAX_RESPONSE_LEN);
    }

    #[test]
    fn derived_registers_come_from_control_values() {
        let r = Register::new(ChannelKind::Temperature, Slot::Final);
        assert_eq!(r.command(), Command::ControlValues);
        let r = Register::new(ChannelKind::Temperature, Slot::Probe(2));
        assert_eq!(r.command(), Command::Temperature);
        let r = Register::new(ChannelKind::SprayerLevel, Slot::Value);
        assert_eq!(r.command(), Command::ControlValues);
    }
}
