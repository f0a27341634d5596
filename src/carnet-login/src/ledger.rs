//! Token ledger: the primary token pair and the two OAuth scope tokens.
//!
//! The ledger is plain data. Validity is a pure comparison against a supplied
//! timestamp; network refreshes live in [`crate::session::Session`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which credential chain an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenScope {
    /// Token pair from the identity exchange.
    #[serde(rename = "primary")]
    Primary,
    /// OAuth scope for the vehicle backends.
    #[serde(rename = "sc2:fal")]
    Vehicle,
    /// OAuth scope obtained by refresh-exchanging the vehicle scope.
    #[serde(rename = "t2_v:cubic")]
    Secondary,
}

impl TokenScope {
    /// OAuth scopes in the order they are checked and acquired.
    pub const OAUTH: [TokenScope; 2] = [TokenScope::Vehicle, TokenScope::Secondary];

    /// Scope name understood by the OAuth endpoint.
    pub fn oauth_name(&self) -> Option<&'static str> {
        match self {
            TokenScope::Primary => None,
            TokenScope::Vehicle => Some("sc2:fal"),
            TokenScope::Secondary => Some("t2_v:cubic"),
        }
    }

    pub fn from_oauth_name(name: &str) -> Option<Self> {
        Self::OAUTH
            .into_iter()
            .find(|scope| scope.oauth_name() == Some(name))
    }
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.oauth_name() {
            Some(name) => write!(f, "OAuth {name}"),
            None => write!(f, "primary token"),
        }
    }
}

/// Token response shared by the token service and the OAuth endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// One token-like artifact with its own expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// Unix timestamp of issuance.
    #[serde(rename = "timestamp")]
    pub issued_at: i64,
    pub scope: TokenScope,
}

/// Where an entry stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Valid,
    /// Expired but carries a refresh artifact.
    Refreshable,
    /// Expired without a refresh artifact, or never obtained.
    Unavailable,
}

impl TokenEntry {
    pub fn from_response(response: TokenResponse, scope: TokenScope, issued_at: i64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            expires_in: response.expires_in,
            issued_at,
            scope,
        }
    }

    /// New entry from a refresh response, keeping artifacts the response omits.
    pub fn refreshed(&self, response: TokenResponse, now: i64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .or_else(|| self.refresh_token.clone()),
            id_token: response.id_token.or_else(|| self.id_token.clone()),
            expires_in: response.expires_in,
            issued_at: now,
            scope: self.scope,
        }
    }

    pub fn expires_at(&self) -> i64 {
        self.issued_at.saturating_add(self.expires_in)
    }

    pub fn is_valid(&self, now: i64) -> bool {
        now < self.expires_at()
    }

    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn state(&self, now: i64) -> EntryState {
        if self.is_valid(now) {
            EntryState::Valid
        } else if self.is_refreshable() {
            EntryState::Refreshable
        } else {
            EntryState::Unavailable
        }
    }
}

/// Outcome of a ledger check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Valid,
    PrimaryUnavailable,
    ScopeUnavailable(TokenScope),
}

impl LedgerStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, LedgerStatus::Valid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenLedger {
    primary: Option<TokenEntry>,
    vehicle: Option<TokenEntry>,
    secondary: Option<TokenEntry>,
}

impl TokenLedger {
    /// Rebuild a ledger from the persisted `tokens` and `oauth` records.
    pub fn from_parts(primary: Option<TokenEntry>, oauth: BTreeMap<String, TokenEntry>) -> Self {
        let mut ledger = Self {
            primary,
            ..Self::default()
        };
        for (name, mut entry) in oauth {
            match TokenScope::from_oauth_name(&name) {
                Some(scope) => {
                    entry.scope = scope;
                    ledger.replace(entry);
                }
                None => tracing::warn!(scope = %name, "Ignoring unknown OAuth scope in access file"),
            }
        }
        ledger
    }

    /// OAuth entries keyed by scope name, as persisted.
    pub fn oauth_entries(&self) -> BTreeMap<String, TokenEntry> {
        TokenScope::OAUTH
            .into_iter()
            .filter_map(|scope| {
                let entry = self.get(scope)?.clone();
                Some((scope.oauth_name()?.to_string(), entry))
            })
            .collect()
    }

    pub fn get(&self, scope: TokenScope) -> Option<&TokenEntry> {
        match scope {
            TokenScope::Primary => self.primary.as_ref(),
            TokenScope::Vehicle => self.vehicle.as_ref(),
            TokenScope::Secondary => self.secondary.as_ref(),
        }
    }

    pub fn primary(&self) -> Option<&TokenEntry> {
        self.primary.as_ref()
    }

    /// Store an entry in the slot named by its scope.
    pub(crate) fn replace(&mut self, entry: TokenEntry) {
        let slot = match entry.scope {
            TokenScope::Primary => &mut self.primary,
            TokenScope::Vehicle => &mut self.vehicle,
            TokenScope::Secondary => &mut self.secondary,
        };
        *slot = Some(entry);
    }

    pub fn state(&self, scope: TokenScope, now: i64) -> EntryState {
        self.get(scope)
            .map_or(EntryState::Unavailable, |entry| entry.state(now))
    }

    /// True when all three entries are valid at `now`.
    pub fn all_valid(&self, now: i64) -> bool {
        [TokenScope::Primary, TokenScope::Vehicle, TokenScope::Secondary]
            .into_iter()
            .all(|scope| self.state(scope, now) == EntryState::Valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(scope: TokenScope, issued_at: i64, refresh: Option<&str>) -> TokenEntry {
        TokenEntry {
            access_token: format!("{scope}-access"),
            refresh_token: refresh.map(str::to_string),
            id_token: None,
            expires_in: 3600,
            issued_at,
            scope,
        }
    }

    #[test]
    fn test_validity_boundary() {
        let e = entry(TokenScope::Primary, 1_000, None);
        assert!(e.is_valid(4_599));
        assert!(!e.is_valid(4_600));
    }

    #[test]
    fn test_entry_states() {
        assert_eq!(
            entry(TokenScope::Vehicle, 0, Some("r")).state(10),
            EntryState::Valid
        );
        assert_eq!(
            entry(TokenScope::Vehicle, 0, Some("r")).state(10_000),
            EntryState::Refreshable
        );
        assert_eq!(
            entry(TokenScope::Vehicle, 0, Some("")).state(10_000),
            EntryState::Unavailable
        );
        assert_eq!(
            TokenLedger::default().state(TokenScope::Secondary, 0),
            EntryState::Unavailable
        );
    }

    #[test]
    fn test_refreshed_updates_timestamp_and_keeps_scope() {
        let old = entry(TokenScope::Secondary, 100, Some("old-refresh"));
        let response = TokenResponse {
            access_token: "new-access".to_string(),
            refresh_token: None,
            id_token: None,
            expires_in: 1800,
        };
        let new = old.refreshed(response, 9_000);
        assert_eq!(new.issued_at, 9_000);
        assert_eq!(new.scope, TokenScope::Secondary);
        assert_eq!(new.access_token, "new-access");
        assert_eq!(new.refresh_token.as_deref(), Some("old-refresh"));
        assert!(new.is_valid(9_000 + 1_799));
    }

    #[test]
    fn test_persisted_shape_roundtrip() {
        let mut ledger = TokenLedger::default();
        ledger.replace(entry(TokenScope::Primary, 5, Some("p")));
        ledger.replace(entry(TokenScope::Vehicle, 6, Some("v")));
        ledger.replace(entry(TokenScope::Secondary, 7, Some("s")));

        let oauth = ledger.oauth_entries();
        assert_eq!(
            oauth.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["sc2:fal", "t2_v:cubic"]
        );

        let json = serde_json::to_value(&oauth["sc2:fal"]).unwrap();
        assert_eq!(json["timestamp"], 6);
        assert_eq!(json["scope"], "sc2:fal");

        let rebuilt = TokenLedger::from_parts(ledger.primary().cloned(), oauth);
        assert_eq!(rebuilt, ledger);
    }

    #[test]
    fn test_all_valid() {
        let mut ledger = TokenLedger::default();
        ledger.replace(entry(TokenScope::Primary, 0, None));
        ledger.replace(entry(TokenScope::Vehicle, 0, None));
        assert!(!ledger.all_valid(10));
        ledger.replace(entry(TokenScope::Secondary, 0, None));
        assert!(ledger.all_valid(10));
        assert!(!ledger.all_valid(3_600));
    }

    #[test]
    fn test_token_response_defaults() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","token_type":"bearer"}"#).unwrap();
        assert_eq!(parsed.expires_in, 3600);
        assert!(parsed.refresh_token.is_none());
        assert!(serde_json::from_str::<TokenResponse>(r#"{"expires_in":5}"#).is_err());
    }
}
