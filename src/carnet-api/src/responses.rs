//! Typed views of the backend documents the client reads.
//!
//! Only the fields the client uses are modelled; everything else is ignored.

use serde::Deserialize;

/// `{"content": ...}` wrapper used throughout the MBB documents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Content<T> {
    pub content: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeRegionResponse {
    pub home_region: HomeRegion,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeRegion {
    pub base_uri: Content<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPinAuthRequested {
    pub security_pin_auth_info: SecurityPinAuthInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPinAuthInfo {
    pub security_token: String,
    pub security_pin_transmission: SecurityPinTransmission,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityPinTransmission {
    pub challenge: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPinAuthCompleted {
    #[serde(default)]
    pub security_token: Option<String>,
}

/// Acknowledgement returned by the climatisation and charger action endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionAcknowledgement {
    pub action: ActionState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    #[serde(default)]
    pub action_state: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl ActionAcknowledgement {
    /// Whether the backend queued an action of the given type.
    pub fn is_queued(&self, kind: &str) -> bool {
        self.action.action_state == "queued" && self.action.kind == kind
    }
}

/// Acknowledgement of a lock or unlock request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RluActionResponse {
    pub rlu_action_response: RluAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RluAction {
    #[serde(default)]
    pub request_id: Option<serde_json::Value>,
}

impl RluActionResponse {
    pub fn is_accepted(&self) -> bool {
        self.rlu_action_response
            .request_id
            .as_ref()
            .is_some_and(|id| !id.is_null())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClimaterResponse {
    pub climater: Climater,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Climater {
    pub status: ClimaterStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimaterStatus {
    #[serde(default)]
    pub climatisation_status_data: Option<ClimatisationStatusData>,
    #[serde(default)]
    pub window_heating_status_data: Option<WindowHeatingStatusData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimatisationStatusData {
    #[serde(default)]
    pub climatisation_state: Option<Content<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowHeatingStatusData {
    #[serde(default)]
    pub window_heating_state_front: Option<Content<String>>,
    #[serde(default)]
    pub window_heating_state_rear: Option<Content<String>>,
}

impl ClimaterStatus {
    pub fn is_climatising(&self) -> bool {
        self.climatisation_status_data
            .as_ref()
            .and_then(|d| d.climatisation_state.as_ref())
            .is_some_and(|s| s.content == "heating")
    }

    pub fn is_window_heating(&self) -> bool {
        let Some(data) = &self.window_heating_status_data else {
            return false;
        };
        [&data.window_heating_state_front, &data.window_heating_state_rear]
            .into_iter()
            .flatten()
            .any(|s| s.content == "on")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargerResponse {
    pub charger: Charger,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Charger {
    pub status: ChargerStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargerStatus {
    pub charging_status_data: ChargingStatusData,
    pub battery_status_data: BatteryStatusData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStatusData {
    pub charging_state: Content<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStatusData {
    pub state_of_charge: Content<serde_json::Value>,
}

impl ChargerStatus {
    pub fn is_charging(&self) -> bool {
        self.charging_status_data.charging_state.content != "off"
    }

    /// State of charge in percent; the backend sends a number or a numeric string.
    pub fn battery_level(&self) -> Option<i64> {
        match &self.battery_status_data.state_of_charge.content {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealCarData {
    #[serde(default)]
    pub real_cars: Vec<RealCar>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealCar {
    pub vehicle_identification_number: String,
    #[serde(default)]
    pub nickname: Option<String>,
}
