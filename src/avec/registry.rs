//! The in-memory store of sensor metadata.
//!
//! Names and labels arrive over the wire interleaved with the values they
//! describe, in no particular order. The registry caches both so that value
//! samples can be resolved as soon as their metadata has been seen. Entries
//! persist for the lifetime of the registry; there is no eviction.

use alloc::collections::BTreeMap;
use alloc::string::String;

use log::debug;

use super::packet::{LabelRef, Value};

/// Metadata store mapping sensors and their labels, keyed by serial number
/// and by (serial number, local id).
#[derive(Debug, Default)]
pub struct Registry {
    sensors: BTreeMap<u32, Sensor>,
}

/// A sensor known to the registry.
///
/// A sensor may be created as a placeholder, before its name has been
/// announced, when one of its labels or values is seen first.
#[derive(Debug)]
pub struct Sensor {
    serial_id: u32,
    name: Option<String>,
    labels: BTreeMap<u8, Label>,
}

impl Sensor {
    /// The sensor's serial number.
    pub fn serial_id(&self) -> u32 {
        self.serial_id
    }

    /// The sensor's announced name, if one has been seen.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The sensor's labels, in local-id order.
    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.values()
    }
}

/// A value label known to the registry.
#[derive(Debug)]
pub struct Label {
    serial_id: u32,
    id: u8,
    label: Option<String>,
    unit: Option<String>,
}

impl Label {
    /// Serial number of the owning sensor.
    pub fn serial_id(&self) -> u32 {
        self.serial_id
    }

    /// Identifier of the labelled value within its sensor.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The label text.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The unit text.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a sensor by serial number.
    pub fn find_sensor(&self, serial_id: u32) -> Option<&Sensor> {
        self.sensors.get(&serial_id)
    }

    /// Look up a label by serial number and local id.
    pub fn find_label(&self, serial_id: u32, id: u8) -> Option<&Label> {
        self.sensors.get(&serial_id)?.labels.get(&id)
    }

    /// The known sensors, in serial-number order.
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    /// Insert a sensor, or return the existing entry.
    ///
    /// A supplied name fills an unnamed entry; an already-named sensor
    /// keeps its stored text.
    pub fn append_sensor(&mut self, serial_id: u32, name: Option<String>) -> &Sensor {
        let sensor = self.sensors.entry(serial_id).or_insert_with(|| Sensor {
            serial_id,
            name: None,
            labels: BTreeMap::new(),
        });

        if sensor.name.is_none() && name.is_some() {
            debug!("sensor {serial_id:#010x} named {:?}", name.as_deref());
            sensor.name = name;
        }

        sensor
    }

    /// Insert a label, or return the existing entry unchanged.
    ///
    /// A placeholder sensor is created when the serial number has not been
    /// seen before. The supplied text is ignored for a pre-existing label.
    pub fn append_label(
        &mut self,
        serial_id: u32,
        id: u8,
        label: Option<String>,
        unit: Option<String>,
    ) -> &Label {
        let sensor = self.sensors.entry(serial_id).or_insert_with(|| Sensor {
            serial_id,
            name: None,
            labels: BTreeMap::new(),
        });

        sensor.labels.entry(id).or_insert_with(|| {
            debug!("label {serial_id:#010x}/{id} registered");
            Label {
                serial_id,
                id,
                label,
                unit,
            }
        })
    }

    /// Supply metadata for a value the host already knows out-of-band.
    ///
    /// A no-op returning `false` when a label for the value's serial and id
    /// already exists. Otherwise a label is synthesized from the supplied
    /// text (creating or naming a placeholder sensor as needed) and `true`
    /// is returned. The value itself is not retroactively resolved; the
    /// next decoded sample for the same serial and id will be.
    pub fn complete_value(&mut self, value: &Value, name: &str, label: &str, unit: &str) -> bool {
        if self.find_label(value.serial_id, value.id).is_some() {
            return false;
        }

        self.append_label(
            value.serial_id,
            value.id,
            Some(String::from(label)),
            Some(String::from(unit)),
        );
        self.append_sensor(value.serial_id, Some(String::from(name)));

        true
    }

    /// Resolve the registry metadata for a value, as an owned snapshot.
    pub(super) fn resolve(&self, serial_id: u32, id: u8) -> Option<LabelRef> {
        let sensor = self.sensors.get(&serial_id)?;
        let label = sensor.labels.get(&id)?;

        Some(LabelRef {
            label: label.label.clone(),
            unit: label.unit.clone(),
            sensor: sensor.name.clone(),
        })
    }
}
