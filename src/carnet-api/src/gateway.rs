//! Command gateway: every backend call goes through [`Gateway::execute`].
//!
//! Before each call the token ledger is checked and, when it cannot be made
//! valid, the login flow runs once. The gateway then attaches the bearer token
//! of the requested scope, the app identification headers and an optional
//! secure token, and classifies the response.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use carnet_login::constants::{APP_NAME, APP_VERSION};
use carnet_login::{Error, HttpRequest, LedgerStatus, Method, Result, Session, TokenScope};

use crate::secure::SecureToken;

/// Default management cluster.
pub const MAL_URL: &str = "https://mal-1a.prd.ece.vwg-connect.com/api";

/// Vehicle base for vehicles homed in the default cluster.
pub const BASE_URL: &str = "https://msg.volkswagen.de/fs-car";

/// Accept header understood by the MBB backends.
pub const MBB_ACCEPT: &str = "application/json, application/vnd.volkswagenag.com-error-v1+json, */*";

pub const DEFAULT_BRAND: &str = "VW";
pub const DEFAULT_COUNTRY: &str = "DE";

#[derive(Debug)]
enum Payload {
    None,
    Json(serde_json::Value),
    Raw { content_type: String, body: String },
}

/// A backend call, before authentication headers are attached.
#[derive(Debug)]
pub struct ApiRequest {
    method: Method,
    base: String,
    path: String,
    scope: TokenScope,
    accept: String,
    payload: Payload,
    secure_token: Option<SecureToken>,
}

impl ApiRequest {
    pub fn get(base: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::Get, base.into(), path.into())
    }

    pub fn post(base: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::Post, base.into(), path.into())
    }

    fn new(method: Method, base: String, path: String) -> Self {
        Self {
            method,
            base,
            path,
            scope: TokenScope::Primary,
            accept: "application/json".to_string(),
            payload: Payload::None,
            secure_token: None,
        }
    }

    pub fn scope(mut self, scope: TokenScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.payload = Payload::Json(body);
        self
    }

    pub fn raw(mut self, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        self.payload = Payload::Raw {
            content_type: content_type.into(),
            body: body.into(),
        };
        self
    }

    /// Attach a secure token; it is consumed by this request.
    pub fn secure(mut self, token: SecureToken) -> Self {
        self.secure_token = Some(token);
        self
    }
}

/// Classified response of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(serde_json::Value),
    Raw {
        status: u16,
        content_type: String,
        body: String,
    },
}

impl ApiResponse {
    /// Decode into a typed document. Raw bodies are tried as JSON too.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            ApiResponse::Json(value) => Ok(serde_json::from_value(value)?),
            ApiResponse::Raw { body, .. } => Ok(serde_json::from_str(&body)?),
        }
    }

    pub fn into_json(self) -> Result<serde_json::Value> {
        match self {
            ApiResponse::Json(value) => Ok(value),
            ApiResponse::Raw { body, .. } if body.trim().is_empty() => Ok(serde_json::Value::Null),
            ApiResponse::Raw { body, .. } => Ok(serde_json::from_str(&body)?),
        }
    }
}

/// Owns the session and issues authenticated calls.
pub struct Gateway {
    session: Session,
    brand: String,
    country: String,
}

impl Gateway {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            brand: DEFAULT_BRAND.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }

    /// Select the brand and country substituted into `{brand}`/`{country}`.
    pub fn with_market(mut self, brand: impl Into<String>, country: impl Into<String>) -> Self {
        self.brand = brand.into();
        self.country = country.into();
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Make the ledger valid, logging in once if refreshing is not enough.
    pub fn ensure_session(&mut self) -> Result<()> {
        let status = match self.session.ensure_valid() {
            Ok(status) => status,
            Err(Error::Refresh { scope, message }) => {
                warn!(%scope, %message, "Refresh failed");
                LedgerStatus::ScopeUnavailable(scope)
            }
            Err(e) => return Err(e),
        };
        if status.is_valid() {
            return Ok(());
        }

        debug!(?status, "Credentials unusable, logging in");
        self.session.login()?;
        match self.session.ensure_valid()? {
            LedgerStatus::Valid => Ok(()),
            status => Err(Error::Login(format!(
                "credentials still invalid after login: {status:?}"
            ))),
        }
    }

    /// Run one authenticated call.
    pub fn execute(&mut self, request: ApiRequest) -> Result<ApiResponse> {
        let path = request
            .path
            .replace("{brand}", &self.brand)
            .replace("{country}", &self.country);
        info!(command = %path, "Preparing command");
        debug!(scope = %request.scope, accept = %request.accept, "Command options");

        self.ensure_session()?;

        let url = Url::parse(&format!("{}{path}", request.base))?;
        let mut http = match request.method {
            Method::Get => HttpRequest::get(url),
            Method::Post => HttpRequest::post(url),
        }
        .header(
            "Authorization",
            format!("Bearer {}", self.session.bearer(request.scope)?),
        )
        .header("Accept", request.accept)
        .header("X-App-Version", APP_VERSION)
        .header("X-App-Name", APP_NAME)
        .header("Accept-Language", "en-US");

        if let Some(token) = request.secure_token {
            http = http.header("X-MBBSecToken", token.into_header());
        }
        http = match request.payload {
            Payload::None => http,
            Payload::Json(body) => http.json(body),
            Payload::Raw { content_type, body } => http.raw(content_type, body),
        };

        let response = self.session.send(http)?.error_for_status()?;
        if response.is_json() {
            let value = if response.body.trim().is_empty() {
                serde_json::Value::Null
            } else {
                response.json()?
            };
            return Ok(ApiResponse::Json(value));
        }
        Ok(ApiResponse::Raw {
            status: response.status,
            content_type: response.content_type().to_string(),
            body: response.body,
        })
    }

    /// Execute and decode the JSON body.
    pub fn fetch<T: DeserializeOwned>(&mut self, request: ApiRequest) -> Result<T> {
        self.execute(request)?.decode()
    }
}
