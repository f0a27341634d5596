//! Vehicle status report (VSR) decoding.
//!
//! The report is a flat list of data groups, each holding fields keyed by a
//! hex id. Only the door lock fields are interpreted here.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleStatusReport {
    #[serde(rename = "StoredVehicleDataResponse")]
    pub stored: StoredVehicleData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredVehicleData {
    #[serde(default)]
    pub vin: Option<String>,
    pub vehicle_data: VehicleData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleData {
    #[serde(default)]
    pub data: Vec<DataGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataGroup {
    pub id: String,
    #[serde(default)]
    pub field: Vec<Field>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Field {
    /// Value as text; numbers are rendered without quotes.
    pub fn text(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Door {
    LeftFront,
    LeftRear,
    RightFront,
    RightRear,
    Trunk,
}

impl Door {
    pub const ALL: [Door; 5] = [
        Door::LeftFront,
        Door::LeftRear,
        Door::RightFront,
        Door::RightRear,
        Door::Trunk,
    ];

    /// VSR field id carrying this door's lock state.
    pub fn lock_field(&self) -> &'static str {
        match self {
            Door::LeftFront => "0x0301040001",
            Door::LeftRear => "0x0301040004",
            Door::RightFront => "0x0301040007",
            Door::RightRear => "0x030104000A",
            Door::Trunk => "0x030104000D",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
    Unknown,
}

impl LockState {
    fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("2") => LockState::Locked,
            Some("3") => LockState::Unlocked,
            _ => LockState::Unknown,
        }
    }
}

/// Lock state of every door.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorLocks(BTreeMap<Door, LockState>);

impl DoorLocks {
    pub fn get(&self, door: Door) -> LockState {
        self.0.get(&door).copied().unwrap_or(LockState::Unknown)
    }

    /// Locked only if all five doors report locked.
    pub fn all_locked(&self) -> bool {
        Door::ALL.iter().all(|d| self.get(*d) == LockState::Locked)
    }
}

impl VehicleStatusReport {
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.stored
            .vehicle_data
            .data
            .iter()
            .flat_map(|group| group.field.iter())
            .find(|field| field.id.eq_ignore_ascii_case(id))
    }

    pub fn door_locks(&self) -> DoorLocks {
        DoorLocks(
            Door::ALL
                .into_iter()
                .map(|door| {
                    let code = self.field(door.lock_field()).and_then(Field::text);
                    (door, LockState::from_code(code.as_deref()))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(codes: [&str; 5]) -> VehicleStatusReport {
        let fields: Vec<_> = Door::ALL
            .iter()
            .zip(codes)
            .map(|(door, code)| json!({"id": door.lock_field(), "value": code, "textId": "door_locked"}))
            .collect();
        serde_json::from_value(json!({
            "StoredVehicleDataResponse": {
                "vin": "WVWZZZ",
                "vehicleData": {"data": [
                    {"id": "0x0101010001", "field": [{"id": "0x0101010001", "value": "12345", "unit": "km"}]},
                    {"id": "0x030104FFFF", "field": fields}
                ]}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_all_locked() {
        let vsr = report(["2", "2", "2", "2", "2"]);
        assert!(vsr.door_locks().all_locked());
    }

    #[test]
    fn test_one_unlocked_door() {
        let vsr = report(["2", "2", "2", "2", "3"]);
        let locks = vsr.door_locks();
        assert!(!locks.all_locked());
        assert_eq!(locks.get(Door::Trunk), LockState::Unlocked);
        assert_eq!(locks.get(Door::LeftFront), LockState::Locked);
    }

    #[test]
    fn test_missing_fields_are_unknown() {
        let vsr: VehicleStatusReport = serde_json::from_value(json!({
            "StoredVehicleDataResponse": {"vehicleData": {"data": []}}
        }))
        .unwrap();
        let locks = vsr.door_locks();
        assert_eq!(locks.get(Door::RightRear), LockState::Unknown);
        assert!(!locks.all_locked());
    }

    #[test]
    fn test_numeric_values() {
        let vsr: VehicleStatusReport = serde_json::from_value(json!({
            "StoredVehicleDataResponse": {"vehicleData": {"data": [
                {"id": "g", "field": [{"id": "0x030104000a", "value": 2}]}
            ]}}
        }))
        .unwrap();
        assert_eq!(vsr.door_locks().get(Door::RightRear), LockState::Locked);
        assert_eq!(vsr.field("0x0301040001").map(|f| f.unit.clone()), None);
    }
}
