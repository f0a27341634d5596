//! Command executor: reads the vehicle state and changes it when asked.
//!
//! A state change is only sent when the state read just before differs from
//! the requested one, and the cached state only flips when the backend
//! acknowledges the action as queued with the matching type.

use tracing::{debug, info, warn};

use carnet_api::responses::ActionAcknowledgement;
use carnet_api::{LockAction, Toggle, VehicleClient};
use carnet_login::Result;

use crate::command::{Command, CommandValue};
use crate::config::Config;
use crate::state::{CarState, CarStates};

pub struct Car {
    client: VehicleClient,
    states: CarStates,
    configured_vin: Option<String>,
    temperature: f64,
    combine_heating: bool,
    vin: Option<String>,
}

impl Car {
    pub fn new(client: VehicleClient, states: CarStates, config: &Config) -> Self {
        Self {
            client,
            states,
            configured_vin: config.vin().map(str::to_string),
            temperature: config.temperature,
            combine_heating: config.combine_heating,
            vin: config.vin().map(str::to_string),
        }
    }

    /// VIN the command runs against, once known.
    pub fn vin(&self) -> Option<&str> {
        self.vin.as_deref()
    }

    /// State of the current vehicle; empty until the VIN is known.
    pub fn state(&self) -> CarState {
        self.vin
            .as_deref()
            .and_then(|vin| self.states.get(vin))
            .cloned()
            .unwrap_or_default()
    }

    pub fn states(&self) -> &CarStates {
        &self.states
    }

    pub fn execute(&mut self, command: Command, value: CommandValue) -> Result<()> {
        self.client.login()?;
        let vin = self.resolve_vin()?;
        info!(%command, ?value, "Executing command");

        match command {
            Command::All => {
                self.read_locked(&vin)?;
                self.read_climater(&vin)?;
                self.read_charger(&vin)?;
            }
            Command::Locked => {
                self.read_locked(&vin)?;
                self.update_locked(&vin, value)?;
            }
            Command::Charging => {
                self.read_charger(&vin)?;
                self.update_charging(&vin, value)?;
            }
            Command::Climatisation => {
                self.read_climater(&vin)?;
                self.update_climatisation(&vin, value)?;
                if self.combine_heating {
                    self.update_window_heating(&vin, value)?;
                }
            }
            Command::WindowHeating => {
                self.read_climater(&vin)?;
                self.update_window_heating(&vin, value)?;
            }
        }
        Ok(())
    }

    fn resolve_vin(&mut self) -> Result<String> {
        let vin = match &self.configured_vin {
            Some(vin) => vin.clone(),
            None => {
                let vin = self.client.first_vin()?;
                info!(%vin, "VIN");
                vin
            }
        };
        self.states.entry(&vin);
        self.vin = Some(vin.clone());
        Ok(vin)
    }

    fn read_locked(&mut self, vin: &str) -> Result<()> {
        let locks = self.client.vehicle_status_report(vin)?.door_locks();
        debug!(?locks, "Doors status");
        self.states.entry(vin).locked = Some(locks.all_locked());
        Ok(())
    }

    fn read_climater(&mut self, vin: &str) -> Result<()> {
        let status = self.client.climater(vin)?;
        let state = self.states.entry(vin);
        state.climatisation = Some(status.is_climatising());
        state.window_heating = Some(status.is_window_heating());
        debug!(climatisation = ?state.climatisation, window_heating = ?state.window_heating, "Climater status");
        Ok(())
    }

    fn read_charger(&mut self, vin: &str) -> Result<()> {
        let status = self.client.charger(vin)?;
        let state = self.states.entry(vin);
        state.charging = Some(status.is_charging());
        state.battery_level = status.battery_level();
        debug!(charging = ?state.charging, battery_level = ?state.battery_level, "Charging status");
        Ok(())
    }

    fn update_locked(&mut self, vin: &str, value: CommandValue) -> Result<()> {
        let current = self.states.entry(vin).locked;
        let action = match value {
            _ if value.is_satisfied_by(current) => {
                debug!(?current, "Lock state already as requested");
                return Ok(());
            }
            CommandValue::Enable => LockAction::Lock,
            CommandValue::Disable => LockAction::Unlock,
            CommandValue::QueryOnly => return Ok(()),
        };

        let response = self.client.lock(vin, action)?;
        if response.is_accepted() {
            self.states.entry(vin).locked = Some(action == LockAction::Lock);
        } else {
            warn!(?action, "Lock request was not acknowledged, keeping previous state");
        }
        Ok(())
    }

    fn update_charging(&mut self, vin: &str, value: CommandValue) -> Result<()> {
        let current = self.states.entry(vin).charging;
        let next = self.toggle(vin, value, current, ("start", "stop"), |client, vin, toggle| {
            client.battery_charge(vin, toggle)
        })?;
        self.states.entry(vin).charging = next;
        Ok(())
    }

    fn update_climatisation(&mut self, vin: &str, value: CommandValue) -> Result<()> {
        let current = self.states.entry(vin).climatisation;
        let temperature = self.temperature;
        let next = self.toggle(
            vin,
            value,
            current,
            ("startClimatisation", "stopClimatisation"),
            |client, vin, toggle| match toggle {
                Toggle::On => client.start_climatisation(vin, temperature),
                Toggle::Off => client.stop_climatisation(vin, temperature),
            },
        )?;
        self.states.entry(vin).climatisation = next;
        Ok(())
    }

    fn update_window_heating(&mut self, vin: &str, value: CommandValue) -> Result<()> {
        let current = self.states.entry(vin).window_heating;
        let next = self.toggle(
            vin,
            value,
            current,
            ("startWindowHeating", "stopWindowHeating"),
            |client, vin, toggle| client.window_heating(vin, toggle),
        )?;
        self.states.entry(vin).window_heating = next;
        Ok(())
    }

    /// Send the action if needed and return the resulting state.
    fn toggle<F>(
        &mut self,
        vin: &str,
        value: CommandValue,
        current: Option<bool>,
        (on_kind, off_kind): (&str, &str),
        send: F,
    ) -> Result<Option<bool>>
    where
        F: FnOnce(&mut VehicleClient, &str, Toggle) -> Result<ActionAcknowledgement>,
    {
        let toggle = match value {
            _ if value.is_satisfied_by(current) => return Ok(current),
            CommandValue::Enable => Toggle::On,
            CommandValue::Disable => Toggle::Off,
            CommandValue::QueryOnly => return Ok(current),
        };
        let expected = match toggle {
            Toggle::On => on_kind,
            Toggle::Off => off_kind,
        };

        let ack = send(&mut self.client, vin, toggle)?;
        if ack.is_queued(expected) {
            info!(action = expected, "Action queued");
            Ok(Some(toggle == Toggle::On))
        } else {
            warn!(
                expected,
                state = %ack.action.action_state,
                kind = %ack.action.kind,
                "Action not queued, keeping previous state"
            );
            Ok(current)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use carnet_api::Gateway;
    use carnet_api::vsr::Door;
    use carnet_login::clock::FixedClock;
    use carnet_login::testing::{LOGIN_NOW, ScriptedResponse, ScriptedTransport, script_login};
    use carnet_login::{CredentialStore, Method, Session};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;

    const VIN: &str = "WVWZZZ1KZ0W000001";

    fn config(extra: Value) -> Config {
        let mut base = json!({"username": "user@example.com", "password": "hunter2", "spin": "1234", "vin": VIN});
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        Config::from_arg(&base.to_string()).unwrap()
    }

    fn car(dir: &Path, transport: &ScriptedTransport, config: &Config) -> Car {
        let session = Session::with_clock(
            config.credentials().unwrap(),
            Box::new(transport.clone()),
            CredentialStore::new(dir),
            Box::new(FixedClock::at(LOGIN_NOW)),
        );
        let client = VehicleClient::new(Gateway::new(session));
        Car::new(client, CarStates::load(dir.join("carStates.json")), config)
    }

    fn vsr(locked: bool) -> ScriptedResponse {
        let fields: Vec<Value> = Door::ALL
            .iter()
            .enumerate()
            .map(|(i, door)| {
                let code = if !locked && i == 0 { "3" } else { "2" };
                json!({"id": door.lock_field(), "value": code})
            })
            .collect();
        ScriptedResponse::json(
            200,
            json!({"StoredVehicleDataResponse": {"vin": VIN, "vehicleData": {"data": [
                {"id": "0x030104FFFF", "field": fields}
            ]}}}),
        )
    }

    fn climater(heating: &str, window: &str) -> ScriptedResponse {
        ScriptedResponse::json(
            200,
            json!({"climater": {"status": {
                "climatisationStatusData": {"climatisationState": {"content": heating}},
                "windowHeatingStatusData": {
                    "windowHeatingStateFront": {"content": window},
                    "windowHeatingStateRear": {"content": "off"}
                }
            }}}),
        )
    }

    fn ack(state: &str, kind: &str) -> ScriptedResponse {
        ScriptedResponse::json(200, json!({"action": {"actionState": state, "type": kind}}))
    }

    fn scripted() -> ScriptedTransport {
        let transport = ScriptedTransport::new();
        script_login(&transport);
        transport
            .on(
                Method::Get,
                "/homeRegion",
                ScriptedResponse::json(
                    200,
                    json!({"homeRegion": {"baseUri": {"content": "https://mal-1a.prd.ece.vwg-connect.com/api"}}}),
                ),
            )
            .on(
                Method::Post,
                "/security-pin-auth-requested",
                ScriptedResponse::json(
                    200,
                    json!({"securityPinAuthInfo": {
                        "securityToken": "request-token",
                        "securityPinTransmission": {"challenge": "0A1B"}
                    }}),
                ),
            )
            .on(
                Method::Post,
                "/security-pin-auth-completed",
                ScriptedResponse::json(200, json!({"securityToken": "sec-token"})),
            );
        transport
    }

    #[test]
    fn test_lock_when_already_locked_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport.on(Method::Get, "/bs/vsr/v1/", vsr(true));
        let config = config(json!({}));
        let mut car = car(dir.path(), &transport, &config);

        car.execute(Command::Locked, CommandValue::Enable).unwrap();

        assert_eq!(car.state().locked, Some(true));
        assert_eq!(transport.count(Method::Post, "/bs/rlu/"), 0);
        assert_eq!(transport.count(Method::Post, "/security-pin-auth-requested"), 0);
    }

    #[test]
    fn test_lock_when_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport
            .on(Method::Get, "/bs/vsr/v1/", vsr(false))
            .on(
                Method::Post,
                "/bs/rlu/v1/",
                ScriptedResponse::json(200, json!({"rluActionResponse": {"requestId": 17}})),
            );
        let config = config(json!({}));
        let mut car = car(dir.path(), &transport, &config);

        car.execute(Command::Locked, CommandValue::Enable).unwrap();

        assert_eq!(car.state().locked, Some(true));
        assert_eq!(transport.count(Method::Post, "/bs/rlu/"), 1);
    }

    #[test]
    fn test_unacknowledged_lock_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport
            .on(Method::Get, "/bs/vsr/v1/", vsr(false))
            .on(
                Method::Post,
                "/bs/rlu/v1/",
                ScriptedResponse::json(200, json!({"rluActionResponse": {}})),
            );
        let config = config(json!({}));
        let mut car = car(dir.path(), &transport, &config);

        car.execute(Command::Locked, CommandValue::Enable).unwrap();
        assert_eq!(car.state().locked, Some(false));
    }

    #[test]
    fn test_status_of_everything() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport
            .on(Method::Get, "/bs/vsr/v1/", vsr(true))
            .on(Method::Get, "/climater", climater("heating", "on"))
            .on(
                Method::Get,
                "/charger",
                ScriptedResponse::json(
                    200,
                    json!({"charger": {"status": {
                        "chargingStatusData": {"chargingState": {"content": "charging"}},
                        "batteryStatusData": {"stateOfCharge": {"content": 63}}
                    }}}),
                ),
            );
        let config = config(json!({}));
        let mut car = car(dir.path(), &transport, &config);

        car.execute(Command::All, CommandValue::QueryOnly).unwrap();
        assert_eq!(
            car.state(),
            CarState {
                climatisation: Some(true),
                window_heating: Some(true),
                locked: Some(true),
                battery_level: Some(63),
                charging: Some(true),
            }
        );
        assert_eq!(transport.count(Method::Post, "/actions"), 0);
    }

    #[test]
    fn test_start_climatisation_with_combined_heating() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport
            .on(Method::Get, "/climater", climater("off", "off"))
            .on(Method::Post, "/climater/actions", ack("queued", "startClimatisation"))
            .on(Method::Post, "/climater/actions", ack("queued", "startWindowHeating"));
        let config = config(json!({"combineHeating": true, "temperature": 20}));
        let mut car = car(dir.path(), &transport, &config);

        car.execute(Command::Climatisation, CommandValue::Enable).unwrap();

        let state = car.state();
        assert_eq!(state.climatisation, Some(true));
        assert_eq!(state.window_heating, Some(true));
        assert_eq!(transport.count(Method::Post, "/climater/actions"), 2);

        let requests = transport.requests();
        let first = requests
            .iter()
            .find(|r| r.url.as_str().ends_with("/climater/actions"))
            .unwrap();
        let carnet_login::Body::Json(body) = &first.body else {
            panic!("expected a JSON body");
        };
        assert_eq!(body["action"]["settings"]["targetTemperature"], 2931);
    }

    #[test]
    fn test_mismatched_acknowledgement_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport
            .on(Method::Get, "/climater", climater("heating", "off"))
            .on(Method::Post, "/climater/actions", ack("queued", "startClimatisation"));
        let config = config(json!({}));
        let mut car = car(dir.path(), &transport, &config);

        car.execute(Command::Climatisation, CommandValue::Disable).unwrap();
        assert_eq!(car.state().climatisation, Some(true));
    }

    #[test]
    fn test_stop_charging() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport
            .on(
                Method::Get,
                "/charger",
                ScriptedResponse::json(
                    200,
                    json!({"charger": {"status": {
                        "chargingStatusData": {"chargingState": {"content": "charging"}},
                        "batteryStatusData": {"stateOfCharge": {"content": "40"}}
                    }}}),
                ),
            )
            .on(Method::Post, "/charger/actions", ack("queued", "stop"));
        let config = config(json!({"spin": ""}));
        let mut car = car(dir.path(), &transport, &config);

        car.execute(Command::Charging, CommandValue::Disable).unwrap();
        let state = car.state();
        assert_eq!(state.charging, Some(false));
        assert_eq!(state.battery_level, Some(40));
    }

    #[test]
    fn test_partial_failure_keeps_state_read_so_far() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport
            .on(Method::Get, "/bs/vsr/v1/", vsr(true))
            .on(
                Method::Get,
                "/climater",
                ScriptedResponse::json(
                    500,
                    json!({"error": {"errorCode": "gw.error.internal", "description": "Internal"}}),
                ),
            );
        let config = config(json!({}));
        let mut car = car(dir.path(), &transport, &config);

        let err = car.execute(Command::All, CommandValue::QueryOnly).unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(car.state().locked, Some(true));
        assert_eq!(car.vin(), Some(VIN));
    }

    #[test]
    fn test_vin_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let transport = scripted();
        transport
            .on(
                Method::Get,
                "/realCarData",
                ScriptedResponse::json(200, json!({"realCars": [{"vehicleIdentificationNumber": "DISCOVERED"}]})),
            )
            .on(Method::Get, "/climater", climater("off", "off"));
        let config = config(json!({"vin": ""}));
        let mut car = car(dir.path(), &transport, &config);

        car.execute(Command::WindowHeating, CommandValue::QueryOnly).unwrap();
        assert_eq!(car.vin(), Some("DISCOVERED"));
        assert_eq!(car.states().get("DISCOVERED").unwrap().window_heating, Some(false));
    }

    #[test]
    fn test_login_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new();
        transport.on(
            Method::Get,
            "/oidc/v1/authorize",
            ScriptedResponse::json(500, json!({})),
        );
        let config = config(json!({}));
        let mut car = car(dir.path(), &transport, &config);

        let err = car.execute(Command::Locked, CommandValue::QueryOnly).unwrap_err();
        assert!(err.is_login());
        assert_eq!(car.vin(), Some(VIN));
        assert_eq!(car.state(), CarState::default());
    }
}
