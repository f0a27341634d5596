//! Authenticated session: credentials, transport, persisted access and the
//! token ledger checks that keep it usable.

use tracing::{debug, info, warn};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::constants::{OAUTH_URL, TOKEN_URL};
use crate::error::{Error, Result};
use crate::ledger::{EntryState, LedgerStatus, TokenEntry, TokenLedger, TokenResponse, TokenScope};
use crate::store::{AccessRecord, CredentialStore};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::types::{Credentials, IdentityContext};
use crate::utils::mask_secret;

/// Owns everything needed to talk to the backends on behalf of one user.
pub struct Session {
    credentials: Credentials,
    transport: Box<dyn Transport>,
    store: CredentialStore,
    clock: Box<dyn Clock>,
    ledger: TokenLedger,
    identity: IdentityContext,
    client_id: Option<String>,
}

impl Session {
    pub fn new(credentials: Credentials, transport: Box<dyn Transport>, store: CredentialStore) -> Self {
        Self::with_clock(credentials, transport, store, Box::new(SystemClock))
    }

    /// Build a session, seeding cookies and access from the store.
    pub fn with_clock(
        credentials: Credentials,
        transport: Box<dyn Transport>,
        store: CredentialStore,
        clock: Box<dyn Clock>,
    ) -> Self {
        if let Some(cookies) = store.load_cookies() {
            debug!(count = cookies.cookies.len(), "Restored session cookies");
            transport.restore_cookies(cookies);
        }
        let record = store.load_access().unwrap_or_default();
        let ledger = record.ledger();

        Self {
            credentials,
            transport,
            store,
            clock,
            ledger,
            identity: record.identity,
            client_id: record.client_id,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.transport.send(request)
    }

    /// Access token for `scope`.
    pub fn bearer(&self, scope: TokenScope) -> Result<&str> {
        self.ledger
            .get(scope)
            .map(|entry| entry.access_token.as_str())
            .ok_or_else(|| Error::Login(format!("no {scope} available")))
    }

    /// Make every ledger entry valid, refreshing where possible.
    ///
    /// Performs no network activity when all entries are still valid.
    pub fn ensure_valid(&mut self) -> Result<LedgerStatus> {
        debug!("Checking tokens");

        match self.ledger.state(TokenScope::Primary, self.now()) {
            EntryState::Valid => debug!("Tokens still valid"),
            EntryState::Refreshable => {
                debug!("Token expired. Refreshing tokens");
                self.refresh_primary()?;
            }
            EntryState::Unavailable => {
                debug!("Token checking failed");
                return Ok(LedgerStatus::PrimaryUnavailable);
            }
        }

        for scope in TokenScope::OAUTH {
            match self.ledger.state(scope, self.now()) {
                EntryState::Valid => debug!(%scope, "Still valid"),
                EntryState::Refreshable => {
                    debug!(%scope, "Expired. Refreshing");
                    self.refresh_scope(scope)?;
                }
                EntryState::Unavailable => {
                    warn!(%scope, "Not present. Cannot refresh");
                    return Ok(LedgerStatus::ScopeUnavailable(scope));
                }
            }
        }

        let now = self.now();
        if self.ledger.state(TokenScope::Primary, now) != EntryState::Valid {
            return Ok(LedgerStatus::PrimaryUnavailable);
        }
        Ok(TokenScope::OAUTH
            .into_iter()
            .find(|scope| self.ledger.state(*scope, now) != EntryState::Valid)
            .map_or(LedgerStatus::Valid, LedgerStatus::ScopeUnavailable))
    }

    fn refresh_primary(&mut self) -> Result<()> {
        let scope = TokenScope::Primary;
        let entry = self.refreshable_entry(scope)?;
        let refresh_token = entry.refresh_token.clone().unwrap_or_default();

        let url = Url::parse(&format!("{TOKEN_URL}/refreshTokens"))?;
        let request = HttpRequest::post(url).form([("refresh_token", refresh_token)]);
        let response = self
            .token_request(request)
            .map_err(|e| refresh_error(scope, e))?;

        self.install(entry.refreshed(response, self.now()));
        info!("Refreshed tokens");
        self.persist_access()
    }

    fn refresh_scope(&mut self, scope: TokenScope) -> Result<()> {
        let entry = self.refreshable_entry(scope)?;
        let refresh_token = entry.refresh_token.clone().unwrap_or_default();

        let response = self
            .oauth_exchange(scope, "refresh_token", &refresh_token)
            .map_err(|e| refresh_error(scope, e))?;

        self.install(entry.refreshed(response, self.now()));
        info!(%scope, "Refreshed");
        self.persist_access()
    }

    fn refreshable_entry(&self, scope: TokenScope) -> Result<TokenEntry> {
        self.ledger
            .get(scope)
            .filter(|e| e.is_refreshable())
            .cloned()
            .ok_or_else(|| Error::Refresh {
                scope,
                message: "no refresh token".to_string(),
            })
    }

    /// POST to the MBB OAuth endpoint for `scope`.
    pub(crate) fn oauth_exchange(
        &self,
        scope: TokenScope,
        grant_type: &str,
        token: &str,
    ) -> Result<TokenResponse> {
        let name = scope
            .oauth_name()
            .ok_or_else(|| Error::Unexpected(format!("{scope} is not an OAuth scope")))?;
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| Error::Unexpected("client id not registered".to_string()))?;
        debug!(scope = name, token = %mask_secret(token), "Requesting OAuth token");

        let request = HttpRequest::post(Url::parse(OAUTH_URL)?)
            .header("X-Client-Id", client_id)
            .form([
                ("grant_type", grant_type),
                ("scope", name),
                ("token", token),
            ]);
        self.token_request(request)
    }

    pub(crate) fn token_request(&self, request: HttpRequest) -> Result<TokenResponse> {
        self.send(request)?.error_for_status()?.json()
    }

    pub(crate) fn install(&mut self, entry: TokenEntry) {
        self.ledger.replace(entry);
    }

    pub(crate) fn identity_mut(&mut self) -> &mut IdentityContext {
        &mut self.identity
    }

    pub(crate) fn set_client_id(&mut self, client_id: String) {
        self.client_id = Some(client_id);
    }

    /// Run the full login flow, replacing identity and tokens.
    pub fn login(&mut self) -> Result<()> {
        warn!("Forcing login");
        crate::login::LoginFlow::new(self).run()
    }

    pub fn persist_access(&self) -> Result<()> {
        let record = AccessRecord::new(self.identity.clone(), &self.ledger, self.client_id.clone());
        self.store.save_access(&record)
    }

    pub fn persist_cookies(&self) -> Result<()> {
        self.store.save_cookies(&self.transport.cookies())
    }
}

fn refresh_error(scope: TokenScope, error: Error) -> Error {
    Error::Refresh {
        scope,
        message: error.to_string(),
    }
}
