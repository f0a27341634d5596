//! Credential and identity types.

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};

/// Four digit security PIN required by state-changing vehicle commands.
pub struct SecurityPin(SecretString);

impl SecurityPin {
    /// Parse a PIN, rejecting anything that is not exactly four ASCII digits.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Configuration(
                "wrong S-PIN format: must be 4 digits".to_string(),
            ));
        }
        Ok(Self(SecretString::from(raw.to_string())))
    }

    /// Build a PIN from its numeric form, zero-padding to four digits.
    pub fn from_number(value: u64) -> Result<Self> {
        Self::parse(&format!("{value:04}"))
    }

    /// The four digits (exposes the secret).
    pub fn expose_digits(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecurityPin {
    fn clone(&self) -> Self {
        Self(SecretString::from(self.expose_digits().to_string()))
    }
}

impl std::fmt::Debug for SecurityPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecurityPin(****)")
    }
}

/// Username, password and optional PIN, fixed for the process lifetime.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    password: SecretString,
    pin: Option<SecurityPin>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: SecurityPin) -> Self {
        self.pin = Some(pin);
        self
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// The security PIN, if one was configured.
    pub fn pin(&self) -> Option<&SecurityPin> {
        self.pin.as_ref()
    }
}

/// Who the session belongs to, filled in by the login flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IdentityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
}

impl IdentityContext {
    /// Profile endpoint, required by profile-scoped calls.
    pub fn profile_url(&self) -> Result<&str> {
        self.profile_url
            .as_deref()
            .ok_or_else(|| Error::Unexpected("profile endpoint unknown, login first".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_parse() {
        assert_eq!(SecurityPin::parse("0042").unwrap().expose_digits(), "0042");
        assert!(matches!(
            SecurityPin::parse("123"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            SecurityPin::parse("12a4"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            SecurityPin::parse("12345"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_pin_from_number_zero_pads() {
        assert_eq!(SecurityPin::from_number(7).unwrap().expose_digits(), "0007");
        assert!(SecurityPin::from_number(10000).is_err());
    }

    #[test]
    fn test_pin_debug_is_masked() {
        let pin = SecurityPin::parse("1234").unwrap();
        assert!(!format!("{pin:?}").contains("1234"));
        let copy = pin.clone();
        assert!(!format!("{copy:?}").contains("1234"));
        assert_eq!(copy.expose_digits(), "1234");
    }

    #[test]
    fn test_credentials_without_pin() {
        let creds = Credentials::new("user@example.com", "secret");
        assert!(creds.pin().is_none());
        assert_eq!(creds.password(), "secret");
    }
}
