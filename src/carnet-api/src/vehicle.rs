//! Vehicle endpoints: status reads and state-changing actions.

use serde_json::{Value, json};
use tracing::{debug, info};

use carnet_login::{Error, Result, Session, TokenScope};

use crate::gateway::{ApiRequest, BASE_URL, Gateway, MBB_ACCEPT};
use crate::region::{RegionEndpoints, RegionResolver};
use crate::responses::{
    ActionAcknowledgement, ChargerResponse, ChargerStatus, ClimaterResponse, ClimaterStatus,
    RealCarData, RluActionResponse,
};
use crate::secure::{self, operation};
use crate::vsr::VehicleStatusReport;

const LOCK_CONTENT_TYPE: &str = "application/vnd.vwg.mbb.RemoteLockUnlock_v1_0_0+xml";

/// Requested direction of a toggle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAction {
    Lock,
    Unlock,
}

impl LockAction {
    fn name(&self) -> &'static str {
        match self {
            LockAction::Lock => "lock",
            LockAction::Unlock => "unlock",
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            LockAction::Lock => operation::LOCK,
            LockAction::Unlock => operation::UNLOCK,
        }
    }

    fn body(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding= \"UTF-8\" ?>\n<rluAction xmlns=\"http://audi.de/connect/rlu\">\n   <action>{}</action>\n</rluAction>",
            self.name()
        )
    }
}

/// Target temperature in deci-Kelvin as the climatisation endpoint expects it.
pub fn deci_kelvin(celsius: f64) -> i64 {
    (celsius * 10.0).trunc() as i64 + 2731
}

/// High level client for one account's vehicles.
pub struct VehicleClient {
    gateway: Gateway,
    regions: RegionResolver,
}

impl VehicleClient {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            regions: RegionResolver::new(),
        }
    }

    pub fn gateway_mut(&mut self) -> &mut Gateway {
        &mut self.gateway
    }

    pub fn session(&self) -> &Session {
        self.gateway.session()
    }

    /// Make sure the session is usable, logging in when needed.
    pub fn login(&mut self) -> Result<()> {
        self.gateway.ensure_session()
    }

    pub fn home_region(&mut self, vin: &str) -> Result<RegionEndpoints> {
        self.regions.resolve(&mut self.gateway, vin)
    }

    fn vehicle_base(&mut self, vin: &str) -> Result<String> {
        Ok(self.home_region(vin)?.vehicle_base)
    }

    fn profile_request(&mut self, suffix: &str) -> Result<ApiRequest> {
        self.gateway.ensure_session()?;
        let profile = self.gateway.session().identity().profile_url()?.to_string();
        Ok(ApiRequest::get(profile, suffix))
    }

    pub fn personal_data(&mut self) -> Result<Value> {
        let request = self.profile_request("/personalData")?;
        self.gateway.execute(request)?.into_json()
    }

    pub fn real_car_data(&mut self) -> Result<RealCarData> {
        let request = self.profile_request("/realCarData")?;
        self.gateway.fetch(request)
    }

    /// VIN of the first car registered to the account.
    pub fn first_vin(&mut self) -> Result<String> {
        let data = self.real_car_data()?;
        let car = data
            .real_cars
            .into_iter()
            .next()
            .ok_or_else(|| Error::Unexpected("no vehicles registered to this account".to_string()))?;
        info!(vin = %car.vehicle_identification_number, "Discovered VIN");
        Ok(car.vehicle_identification_number)
    }

    pub fn vehicles(&mut self) -> Result<Value> {
        self.gateway
            .execute(
                ApiRequest::get(BASE_URL, "/usermanagement/users/v1/{brand}/{country}/vehicles")
                    .scope(TokenScope::Vehicle),
            )?
            .into_json()
    }

    fn vehicle_get(&mut self, vin: &str, path: String) -> Result<ApiRequest> {
        let base = self.vehicle_base(vin)?;
        Ok(ApiRequest::get(base, path)
            .scope(TokenScope::Vehicle)
            .accept(MBB_ACCEPT))
    }

    fn vehicle_post(&mut self, vin: &str, path: String) -> Result<ApiRequest> {
        let base = self.vehicle_base(vin)?;
        Ok(ApiRequest::post(base, path)
            .scope(TokenScope::Vehicle)
            .accept(MBB_ACCEPT))
    }

    pub fn vehicle_status_report(&mut self, vin: &str) -> Result<VehicleStatusReport> {
        let request =
            self.vehicle_get(vin, format!("/bs/vsr/v1/{{brand}}/{{country}}/vehicles/{vin}/status"))?;
        self.gateway.fetch(request)
    }

    pub fn request_status_update(&mut self, vin: &str) -> Result<Value> {
        let request = self
            .vehicle_post(vin, format!("/bs/vsr/v1/{{brand}}/{{country}}/vehicles/{vin}/requests"))?
            .json(json!({}));
        self.gateway.execute(request)?.into_json()
    }

    pub fn climater(&mut self, vin: &str) -> Result<ClimaterStatus> {
        let request = self.vehicle_get(
            vin,
            format!("/bs/climatisation/v1/{{brand}}/{{country}}/vehicles/{vin}/climater"),
        )?;
        let response: ClimaterResponse = self.gateway.fetch(request)?;
        Ok(response.climater.status)
    }

    pub fn charger(&mut self, vin: &str) -> Result<ChargerStatus> {
        let request = self.vehicle_get(
            vin,
            format!("/bs/batterycharge/v1/{{brand}}/{{country}}/vehicles/{vin}/charger"),
        )?;
        let response: ChargerResponse = self.gateway.fetch(request)?;
        Ok(response.charger.status)
    }

    pub fn lock(&mut self, vin: &str, action: LockAction) -> Result<RluActionResponse> {
        let token = secure::authorize(&mut self.gateway, vin, action.operation())?;
        let request = self
            .vehicle_post(vin, format!("/bs/rlu/v1/{{brand}}/{{country}}/vehicles/{vin}/actions"))?
            .raw(LOCK_CONTENT_TYPE, action.body())
            .secure(token);
        let response = self.gateway.fetch(request)?;
        debug!(action = action.name(), "Lock action sent");
        Ok(response)
    }

    fn climater_action(&mut self, vin: &str, body: Value) -> Result<ActionAcknowledgement> {
        let token = secure::authorize(&mut self.gateway, vin, operation::CLIMATISATION)?;
        let request = self
            .vehicle_post(
                vin,
                format!("/bs/climatisation/v1/{{brand}}/{{country}}/vehicles/{vin}/climater/actions"),
            )?
            .json(body)
            .secure(token);
        self.gateway.fetch(request)
    }

    /// Start climatisation with every zone and mirror heating enabled.
    pub fn start_climatisation(&mut self, vin: &str, celsius: f64) -> Result<ActionAcknowledgement> {
        let zones: Vec<Value> = ["frontLeft", "frontRight", "rearLeft", "rearRight"]
            .into_iter()
            .map(|position| json!({"value": {"position": position, "isEnabled": true}}))
            .collect();
        let body = json!({
            "action": {
                "type": "startClimatisation",
                "settings": {
                    "targetTemperature": deci_kelvin(celsius),
                    "heaterSource": "electric",
                    "climatisationWithoutHVpower": true,
                    "climaterElementSettings": {
                        "isMirrorHeatingEnabled": true,
                        "zoneSettings": {"zoneSetting": zones}
                    }
                }
            }
        });
        self.climater_action(vin, body)
    }

    pub fn stop_climatisation(&mut self, vin: &str, celsius: f64) -> Result<ActionAcknowledgement> {
        let body = json!({
            "action": {
                "type": "stopClimatisation",
                "settings": {"targetTemperature": deci_kelvin(celsius)}
            }
        });
        self.climater_action(vin, body)
    }

    pub fn window_heating(&mut self, vin: &str, toggle: Toggle) -> Result<ActionAcknowledgement> {
        let kind = match toggle {
            Toggle::On => "startWindowHeating",
            Toggle::Off => "stopWindowHeating",
        };
        self.climater_action(vin, json!({"action": {"type": kind}}))
    }

    /// Start or stop charging. No secure token is needed.
    pub fn battery_charge(&mut self, vin: &str, toggle: Toggle) -> Result<ActionAcknowledgement> {
        let kind = match toggle {
            Toggle::On => "start",
            Toggle::Off => "stop",
        };
        let request = self
            .vehicle_post(
                vin,
                format!("/bs/batterycharge/v1/{{brand}}/{{country}}/vehicles/{vin}/charger/actions"),
            )?
            .json(json!({"action": {"type": kind}}));
        self.gateway.fetch(request)
    }
}
