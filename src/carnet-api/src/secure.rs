//! Secure action authorizer.
//!
//! State-changing commands need a single-use token obtained by answering a
//! challenge with a hash of the security PIN.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sha2::{Digest, Sha512};
use tracing::{debug, error, info};

use carnet_login::{Error, Result, SecurityPin, TokenScope};

use crate::gateway::{ApiRequest, Gateway, MAL_URL};
use crate::responses::{SecurityPinAuthCompleted, SecurityPinAuthRequested};

/// Secure operations the client performs.
pub mod operation {
    pub const LOCK: &str = "rlu_v1/operations/LOCK";
    pub const UNLOCK: &str = "rlu_v1/operations/UNLOCK";
    pub const CLIMATISATION: &str = "rclima_v1/operations/P_START_CLIMA_AU";
}

/// Single-use token for the `X-MBBSecToken` header. Not cloneable; attaching
/// it to a request consumes it.
pub struct SecureToken(SecretString);

impl SecureToken {
    pub(crate) fn into_header(self) -> String {
        self.0.expose_secret().to_string()
    }
}

impl std::fmt::Debug for SecureToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecureToken(***)")
    }
}

/// `UPPERHEX(SHA-512(hex_decode(pin || challenge)))`
pub fn hash_pin(pin: &SecurityPin, challenge: &str) -> Result<String> {
    let bytes = hex::decode(format!("{}{challenge}", pin.expose_digits()))
        .map_err(|e| Error::Authorization(format!("malformed challenge: {e}")))?;
    Ok(hex::encode_upper(Sha512::digest(&bytes)))
}

/// Obtain a secure token for `operation` on `vin`.
pub fn authorize(gateway: &mut Gateway, vin: &str, operation: &str) -> Result<SecureToken> {
    let Some(pin) = gateway.session().credentials().pin().cloned() else {
        return Err(Error::Configuration(
            "cannot process this command: S-PIN not provided".to_string(),
        ));
    };

    info!(%operation, "Requesting secure token");
    let requested: SecurityPinAuthRequested = gateway.fetch(
        ApiRequest::post(
            MAL_URL,
            format!(
                "/rolesrights/authorization/v2/vehicles/{vin}/services/{operation}/security-pin-auth-requested"
            ),
        )
        .scope(TokenScope::Vehicle),
    )?;
    let info = requested.security_pin_auth_info;
    let challenge = info.security_pin_transmission.challenge;
    debug!(%challenge, "Received challenge");

    let hash = hash_pin(&pin, &challenge)?;
    info!("Generated secure pin");

    let body = json!({
        "securityPinAuthentication": {
            "securityPin": {
                "challenge": challenge,
                "securityPinHash": hash,
            },
            "securityToken": info.security_token,
        }
    });
    info!("Completing security pin auth");
    let completed: SecurityPinAuthCompleted = gateway.fetch(
        ApiRequest::post(MAL_URL, "/rolesrights/authorization/v2/security-pin-auth-completed")
            .scope(TokenScope::Vehicle)
            .json(body),
    )?;

    match completed.security_token {
        Some(token) if !token.is_empty() => {
            info!("Received security token");
            Ok(SecureToken(SecretString::from(token)))
        }
        _ => {
            error!("No security token found");
            Err(Error::Authorization("no security token in response".to_string()))
        }
    }
}
