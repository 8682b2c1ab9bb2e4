use super::defs::{
    ChannelKind, Command, Register, RegisterValue, Slot, CONTROL_VALUES_LEN,
    MEASUREMENT_FIXED_LEN, PROBE_VALUE_MASK,
};
use crate::protocol::error::DecodeError;

/// Fixed register layout of the control-values page, in wire order.
///
/// `None` marks the reserved word between the reference registers and the
/// actuator levels.
const CONTROL_WORDS: [Option<Register>; 6] = [
    Some(Register::new(ChannelKind::Temperature, Slot::Ideal)),
    Some(Register::new(ChannelKind::Temperature, Slot::Final)),
    Some(Register::new(ChannelKind::EquilibriumMoistureContent, Slot::Ideal)),
    Some(Register::new(ChannelKind::EquilibriumMoistureContent, Slot::Final)),
    Some(Register::new(ChannelKind::MoistureContent, Slot::Final)),
    None,
];

const CONTROL_LEVELS: [ChannelKind; 4] = [
    ChannelKind::HeatingLevel,
    ChannelKind::FansLevel,
    ChannelKind::FlapsLevel,
    ChannelKind::SprayerLevel,
];

/// Ordered registers decoded from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterBatch {
    pub command: Command,
    pub values: Vec<RegisterValue>,
}

impl RegisterBatch {
    /// Decode a response payload using the layout of `command`.
    pub fn decode(command: Command, payload: &[u8]) -> Result<Self, DecodeError> {
        let values = match command.measurement() {
            Some(kind) => decode_measurement(kind, payload)?,
            None => decode_control_values(payload)?,
        };
        Ok(Self { command, values })
    }

    pub fn get(&self, register: Register) -> Option<&RegisterValue> {
        self.values.iter().find(|v| v.register == register)
    }

    /// Number of probes the controller reported on a measurement page.
    pub fn probe_count(&self) -> usize {
        self.values
            .iter()
            .filter(|v| matches!(v.register.slot, Slot::Probe(_)))
            .count()
    }
}

fn be_u16(payload: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([payload[at], payload[at + 1]])
}

/// `[total u16][n u8][probe u16; n]`
fn decode_measurement(kind: ChannelKind, payload: &[u8]) -> Result<Vec<RegisterValue>, DecodeError> {
    if payload.len() < MEASUREMENT_FIXED_LEN {
        return Err(DecodeError::Malformed(format!(
            "{kind} payload needs at least {MEASUREMENT_FIXED_LEN} bytes, got {}",
            payload.len()
        )));
    }
    let reported = payload[2] as usize;
    let needed = MEASUREMENT_FIXED_LEN + reported * 2;
    if payload.len() < needed {
        return Err(DecodeError::Malformed(format!(
            "{kind} payload declares {reported} probes but carries {} bytes",
            payload.len()
        )));
    }

    let mut values = Vec::with_capacity(1 + reported);
    values.push(RegisterValue::new(
        Register::new(kind, Slot::Value),
        be_u16(payload, 0),
    ));
    for i in 0..reported {
        let raw = be_u16(payload, MEASUREMENT_FIXED_LEN + i * 2) & PROBE_VALUE_MASK;
        // reported <= 255 so the 1-based index fits
        let index = (i + 1) as u8;
        values.push(RegisterValue::new(
            Register::new(kind, Slot::Probe(index)),
            raw,
        ));
    }
    Ok(values)
}

fn decode_control_values(payload: &[u8]) -> Result<Vec<RegisterValue>, DecodeError> {
    if payload.len() < CONTROL_VALUES_LEN {
        return Err(DecodeError::Malformed(format!(
            "control values payload needs {CONTROL_VALUES_LEN} bytes, got {}",
            payload.len()
        )));
    }

    let mut values = Vec::with_capacity(CONTROL_WORDS.len() + CONTROL_LEVELS.len());
    let mut at = 0;
    for register in CONTROL_WORDS {
        if let Some(register) = register {
            values.push(RegisterValue::new(register, be_u16(payload, at)));
        }
        at += 2;
    }
    for kind in CONTROL_LEVELS {
        values.push(RegisterValue::new(
            Register::new(kind, Slot::Value),
            payload[at] as u16,
        ));
        at += 1;
    }
    Ok(values)
}
