use crate::{
    device::{Device, EntityId},
    scheduler::CycleReport,
};
use dtouch_sdk::PublishedValue;
use std::collections::BTreeMap;

/// Map one cycle's readings onto the device's entities.
///
/// Entities whose register is stale, or that the controller did not report
/// (e.g. a configured probe beyond the device's probe count), are left out.
/// Nothing is ever carried over from an earlier cycle.
pub fn aggregate(device: &Device, report: &CycleReport) -> BTreeMap<EntityId, PublishedValue> {
    let mut values = BTreeMap::new();
    for entity in device.entities() {
        let Some(reading) = report.register(entity.id.register()) else {
            continue;
        };
        let kind = entity.id.kind;
        values.insert(
            entity.id,
            PublishedValue {
                entity: entity.name.clone(),
                channel: kind.key(),
                value: reading.value,
                accuracy_decimals: kind.accuracy_decimals(),
                unit: kind.unit(),
                cycle: report.cycle,
                timestamp: report.completed_at,
            },
        );
    }
    values
}
