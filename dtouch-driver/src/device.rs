use crate::{
    protocol::{frame::defs::MAX_PROBES, ChannelKind, Command, Register, Slot},
    types::DeviceConfig,
};
use dtouch_sdk::DriverError;
use std::{collections::BTreeSet, fmt, sync::Arc, time::Duration};
use thiserror::Error;

/// Rejected device configuration. Fatal: the device never starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid address {0}: must be within 1..=254")]
    InvalidAddress(u8),

    #[error("Update interval must be greater than zero")]
    InvalidUpdateInterval,

    #[error("Response timeout {timeout_ms} ms must be within 1..={interval_ms} ms")]
    InvalidResponseTimeout { timeout_ms: u64, interval_ms: u64 },

    #[error("{channel}: {requested} probes exceeds the maximum of {max}")]
    TooManyProbes {
        channel: ChannelKind,
        requested: u32,
        max: u8,
    },

    #[error("{0}: probes are not supported on this channel")]
    UnsupportedProbes(ChannelKind),

    #[error("{channel}: the controller has no {flag} register for this channel")]
    UnsupportedFlag {
        channel: ChannelKind,
        flag: &'static str,
    },

    #[error("Duplicate entity name '{0}'")]
    DuplicateEntity(String),

    #[error("No channels configured")]
    NoChannels,
}

impl From<ConfigError> for DriverError {
    fn from(e: ConfigError) -> Self {
        DriverError::ConfigurationError(e.to_string())
    }
}

/// Identity of a published entity: a channel and a slot within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    pub kind: ChannelKind,
    pub slot: Slot,
}

impl EntityId {
    pub const fn new(kind: ChannelKind, slot: Slot) -> Self {
        Self { kind, slot }
    }

    /// Register the entity's value is read from.
    pub fn register(&self) -> Register {
        Register::new(self.kind, self.slot)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.register().fmt(f)
    }
}

/// Published name for `slot` of a channel named `base`.
pub fn entity_name(base: &str, slot: Slot) -> String {
    match slot {
        Slot::Value => base.to_string(),
        Slot::Probe(k) => format!("{base}_probe_{k}"),
        Slot::Ideal => format!("{base}_ideal"),
        Slot::Final => format!("{base}_final"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    pub name: Arc<str>,
}

/// A configured channel and the entities it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub kind: ChannelKind,
    pub name: Arc<str>,
    pub num_probes: u8,
    pub ideal: bool,
    pub final_value: bool,
}

impl Channel {
    /// Main value, probes 1..=N, then ideal and final when enabled.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        std::iter::once(Slot::Value)
            .chain((1..=self.num_probes).map(Slot::Probe))
            .chain(self.ideal.then_some(Slot::Ideal))
            .chain(self.final_value.then_some(Slot::Final))
    }

    /// Whether any entity of this channel is served by `command`.
    pub fn uses(&self, command: Command) -> bool {
        self.slots()
            .any(|slot| Register::new(self.kind, slot).command() == command)
    }
}

/// Immutable device model built from a validated [`DeviceConfig`].
#[derive(Debug, Clone)]
pub struct Device {
    pub address: u8,
    pub update_interval: Duration,
    /// Share of the update interval owned by each command. Input arriving
    /// after the reply window but before the slot ends is discarded.
    pub command_slot: Duration,
    pub response_timeout: Duration,
    /// Commands polled each cycle, in wire order.
    pub commands: Vec<Command>,
    pub channels: Vec<Channel>,
    entities: Vec<Entity>,
}

impl Device {
    pub fn from_config(cfg: &DeviceConfig) -> Result<Self, ConfigError> {
        if cfg.address == 0 || cfg.address == u8::MAX {
            return Err(ConfigError::InvalidAddress(cfg.address));
        }
        if cfg.update_interval_ms == 0 {
            return Err(ConfigError::InvalidUpdateInterval);
        }

        let mut channels = Vec::new();
        for kind in ChannelKind::ALL {
            let Some(ch) = cfg.channel(kind) else {
                continue;
            };
            if ch.num_probes > 0 && !kind.supports_probes() {
                return Err(ConfigError::UnsupportedProbes(kind));
            }
            if ch.num_probes > MAX_PROBES as u32 {
                return Err(ConfigError::TooManyProbes {
                    channel: kind,
                    requested: ch.num_probes,
                    max: MAX_PROBES,
                });
            }
            if ch.ideal && !kind.has_ideal() {
                return Err(ConfigError::UnsupportedFlag {
                    channel: kind,
                    flag: "ideal",
                });
            }
            if ch.final_value && !kind.has_final() {
                return Err(ConfigError::UnsupportedFlag {
                    channel: kind,
                    flag: "final",
                });
            }
            let name = ch.name.as_deref().unwrap_or(kind.key());
            channels.push(Channel {
                kind,
                name: Arc::from(name),
                num_probes: ch.num_probes as u8,
                ideal: ch.ideal,
                final_value: ch.final_value,
            });
        }
        if channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }

        let commands: Vec<Command> = Command::ALL
            .into_iter()
            .filter(|cmd| channels.iter().any(|ch| ch.uses(*cmd)))
            .collect();

        let mut seen = BTreeSet::new();
        let mut entities = Vec::new();
        for ch in &channels {
            for slot in ch.slots() {
                let name = entity_name(&ch.name, slot);
                if !seen.insert(name.clone()) {
                    return Err(ConfigError::DuplicateEntity(name));
                }
                entities.push(Entity {
                    id: EntityId::new(ch.kind, slot),
                    name: Arc::from(name),
                });
            }
        }

        let update_interval = Duration::from_millis(cfg.update_interval_ms);
        let response_timeout = match cfg.response_timeout_ms {
            Some(ms) if ms == 0 || ms > cfg.update_interval_ms => {
                return Err(ConfigError::InvalidResponseTimeout {
                    timeout_ms: ms,
                    interval_ms: cfg.update_interval_ms,
                });
            }
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(DeviceConfig::DEFAULT_RESPONSE_TIMEOUT_MS),
        };
        let command_slot = update_interval / commands.len() as u32;
        // Keep at least as long a guard after the reply window as the window itself.
        let response_timeout = response_timeout.min(command_slot / 2);
        if response_timeout < Duration::from_millis(1) {
            return Err(ConfigError::InvalidResponseTimeout {
                timeout_ms: 0,
                interval_ms: cfg.update_interval_ms,
            });
        }

        Ok(Self {
            address: cfg.address,
            update_interval,
            command_slot,
            response_timeout,
            commands,
            channels,
            entities,
        })
    }

    /// Every entity the device publishes, in a stable order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Log the resolved configuration once at startup.
    pub fn log_summary(&self) {
        tracing::info!(
            address = self.address,
            commands = self.commands.len(),
            interval_ms = self.update_interval.as_millis() as u64,
            slot_ms = self.command_slot.as_millis() as u64,
            response_timeout_ms = self.response_timeout.as_millis() as u64,
            "dTouch device configured"
        );
        for ch in &self.channels {
            tracing::info!(
                channel = %ch.kind,
                name = %ch.name,
                probes = ch.num_probes,
                ideal = ch.ideal,
                final_value = ch.final_value,
                "  channel"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelConfig;

    fn channel(num_probes: u32, ideal: bool, final_value: bool) -> Option<ChannelConfig> {
        Some(ChannelConfig {
            name: None,
            num_probes,
            ideal,
            final_value,
        })
    }

    #[test]
    fn commands_follow_fixed_order() {
        let cfg = DeviceConfig {
            temperature: channel(0, false, false),
            moisture_content: channel(0, false, false),
            ..Default::default()
        };
        let device = Device::from_config(&cfg).unwrap();
        assert_eq!(
            device.commands,
            vec![Command::MoistureContent, Command::Temperature]
        );

        let cfg = DeviceConfig {
            temperature: channel(0, false, true),
            ..Default::default()
        };
        let device = Device::from_config(&cfg).unwrap();
        assert_eq!(
            device.commands,
            vec![Command::Temperature, Command::ControlValues]
        );

        let cfg = DeviceConfig {
            fans_level: channel(0, false, false),
            ..Default::default()
        };
        let device = Device::from_config(&cfg).unwrap();
        assert_eq!(device.commands, vec![Command::ControlValues]);
    }

    #[test]
    fn entities_are_named_per_slot() {
        let cfg = DeviceConfig {
            temperature: Some(ChannelConfig {
                name: Some("kiln".into()),
                num_probes: 2,
                ideal: true,
                final_value: true,
            }),
            ..Default::default()
        };
        let device = Device::from_config(&cfg).unwrap();
        let names: Vec<&str> = device.entities().iter().map(|e| &*e.name).collect();
        assert_eq!(
            names,
            vec!["kiln", "kiln_probe_1", "kiln_probe_2", "kiln_ideal", "kiln_final"]
        );
    }

    #[test]
    fn rejects_invalid_configuration() {
        let err = Device::from_config(&DeviceConfig::default()).unwrap_err();
        assert_eq!(err, ConfigError::NoChannels);

        let cfg = DeviceConfig {
            address: 0,
            temperature: channel(0, false, false),
            ..Default::default()
        };
        assert_eq!(
            Device::from_config(&cfg).unwrap_err(),
            ConfigError::InvalidAddress(0)
        );

        let cfg = DeviceConfig {
            moisture_content: channel(0, true, false),
            ..Default::default()
        };
        assert!(matches!(
            Device::from_config(&cfg).unwrap_err(),
            ConfigError::UnsupportedFlag { flag: "ideal", .. }
        ));

        let cfg = DeviceConfig {
            heating_level: channel(1, false, false),
            ..Default::default()
        };
        assert_eq!(
            Device::from_config(&cfg).unwrap_err(),
            ConfigError::UnsupportedProbes(ChannelKind::HeatingLevel)
        );

        let cfg = DeviceConfig {
            temperature: channel(MAX_PROBES as u32 + 1, false, false),
            ..Default::default()
        };
        assert!(matches!(
            Device::from_config(&cfg).unwrap_err(),
            ConfigError::TooManyProbes { .. }
        ));

        let cfg = DeviceConfig {
            update_interval_ms: 0,
            temperature: channel(0, false, false),
            ..Default::default()
        };
        assert_eq!(
            Device::from_config(&cfg).unwrap_err(),
            ConfigError::InvalidUpdateInterval
        );
    }

    #[test]
    fn rejects_colliding_names() {
        let cfg = DeviceConfig {
            temperature: Some(ChannelConfig {
                name: Some("t".into()),
                num_probes: 1,
                ..Default::default()
            }),
            moisture_content: Some(ChannelConfig {
                name: Some("t_probe_1".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            Device::from_config(&cfg).unwrap_err(),
            ConfigError::DuplicateEntity("t_probe_1".into())
        );
    }

    #[test]
    fn response_timeout_is_clamped_to_half_a_slot() {
        let cfg = DeviceConfig {
            update_interval_ms: 1_000,
            temperature: channel(0, true, false),
            moisture_content: channel(0, false, false),
            equilibrium_moisture_content: channel(0, false, false),
            ..Default::default()
        };
        let device = Device::from_config(&cfg).unwrap();
        assert_eq!(device.commands.len(), 4);
        assert_eq!(device.command_slot, Duration::from_millis(250));
        assert_eq!(device.response_timeout, Duration::from_millis(125));

        let cfg = DeviceConfig {
            temperature: channel(0, false, false),
            ..Default::default()
        };
        let device = Device::from_config(&cfg).unwrap();
        assert_eq!(device.command_slot, Duration::from_millis(5_000));
        assert_eq!(device.response_timeout, Duration::from_millis(500));

        // Four commands cannot share a 4 ms interval.
        let cfg = DeviceConfig {
            update_interval_ms: 4,
            temperature: channel(0, true, false),
            moisture_content: channel(0, false, false),
            equilibrium_moisture_content: channel(0, false, false),
            ..Default::default()
        };
        assert!(matches!(
            Device::from_config(&cfg).unwrap_err(),
            ConfigError::InvalidResponseTimeout { timeout_ms: 0, .. }
        ));

        let cfg = DeviceConfig {
            response_timeout_ms: Some(0),
            temperature: channel(0, false, false),
            ..Default::default()
        };
        assert!(matches!(
            Device::from_config(&cfg).unwrap_err(),
            ConfigError::InvalidResponseTimeout { .. }
        ));
    }
}
