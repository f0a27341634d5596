//! Interactive-free login against the identity provider.
//!
//! The flow scrapes the provider's email and password pages, captures the
//! redirect into the custom scheme, exchanges the auth code for the primary
//! token pair and finally acquires both OAuth scope tokens.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::{
    APP_ID, APP_NAME, APP_VERSION, AUTHORIZE_URL, CLIENT_ID, LOGIN_FORM_ID, LOGIN_SCOPES,
    PROFILE_URL, REDIRECT_URI, REGISTER_URL, TOKEN_URL,
};
use crate::error::{Error, Result};
use crate::html::{self, IdkTemplate, PageForm};
use crate::ledger::{TokenEntry, TokenResponse, TokenScope};
use crate::pkce::{PkceChallenge, random_string};
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse};
use crate::utils::{resolve_action, url_params};

const STATE_LEN: usize = 43;

/// Result of the authorize stage.
struct Authorized {
    pkce: PkceChallenge,
    form: PageForm,
    page_url: Url,
}

/// Result of the email stage.
struct EmailSubmitted {
    idk: IdkTemplate,
    fields: Vec<(String, String)>,
    page_url: Url,
}

#[derive(serde::Deserialize)]
struct Registration {
    client_id: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonalData {
    business_identifier_value: String,
}

/// One run of the login flow over a session.
pub struct LoginFlow<'a> {
    session: &'a mut Session,
}

impl<'a> LoginFlow<'a> {
    pub fn new(session: &'a mut Session) -> Self {
        Self { session }
    }

    /// Run all five stages. Any failure is reported as [`Error::Login`].
    pub fn run(mut self) -> Result<()> {
        info!("Attempting to login");
        self.stages().map_err(|e| {
            if e.is_login() {
                e
            } else {
                Error::Login(e.to_string())
            }
        })
    }

    fn stages(&mut self) -> Result<()> {
        let authorized = self.authorize()?;
        let email = self.submit_email(&authorized)?;
        let terminal = self.submit_password(&authorized, email)?;
        let id_token = self.capture_identity(&terminal, &authorized.pkce)?;
        self.acquire_scopes(&id_token)
    }

    fn authorize(&mut self) -> Result<Authorized> {
        let pkce = PkceChallenge::new()?;
        let method = pkce.method.to_string();
        let state = random_string(STATE_LEN);
        let nonce = random_string(STATE_LEN);

        let request = HttpRequest::get(Url::parse(AUTHORIZE_URL)?).query(&[
            ("prompt", "login"),
            ("state", state.as_str()),
            ("response_type", "code id_token token"),
            ("code_challenge_method", method.as_str()),
            ("scope", LOGIN_SCOPES),
            ("code_challenge", pkce.challenge.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("nonce", nonce.as_str()),
        ]);
        let response = self.session.send(request)?.error_for_status()?;
        let form = html::find_form(&response.body, LOGIN_FORM_ID)
            .map_err(|e| Error::Login(format!("login form not found: {e}")))?;
        info!(action = %form.action, "Found email login url");

        Ok(Authorized {
            pkce,
            form,
            page_url: response.final_url,
        })
    }

    fn submit_email(&mut self, authorized: &Authorized) -> Result<EmailSubmitted> {
        let mut fields = authorized.form.hidden.clone();
        fields.push(("email".to_string(), self.session.credentials().username.clone()));

        let url = resolve_action(&authorized.page_url, &authorized.form.action)?;
        let request = HttpRequest::post(url).form(fields.clone());
        let response = self.session.send(request)?.error_for_status()?;
        let idk = html::extract_idk(&response.body)?;
        debug!(post_action = %idk.post_action, "Found login template model");

        Ok(EmailSubmitted {
            idk,
            fields,
            page_url: response.final_url,
        })
    }

    fn submit_password(&mut self, authorized: &Authorized, email: EmailSubmitted) -> Result<HttpResponse> {
        let EmailSubmitted {
            idk,
            mut fields,
            page_url,
        } = email;
        fields.push(("hmac".to_string(), idk.hmac.clone()));
        fields.push((
            "password".to_string(),
            self.session.credentials().password().to_string(),
        ));

        let action = authorized
            .form
            .action
            .replace(&idk.identifier_url, &idk.post_action);
        let url = resolve_action(&page_url, &action)?;
        let mut response = self.session.send(HttpRequest::post(url).form(fields))?;

        if !response.reached_custom_scheme() {
            info!("No carnet scheme found in response");
            response = self.handle_interstitial(response)?;
        }
        if !response.reached_custom_scheme() {
            return Err(Error::Login(format!(
                "login did not complete, stopped at {}",
                response.final_url
            )));
        }
        Ok(response)
    }

    /// Deal with pages the provider shows instead of completing the login.
    fn handle_interstitial(&mut self, response: HttpResponse) -> Result<HttpResponse> {
        for kit in html::identitykit_meta(&response.body) {
            match kit.as_str() {
                "termsAndConditions" => {
                    debug!("Meta identitykit is termsAndConditions");
                    let Ok(form) = html::find_form(&response.body, LOGIN_FORM_ID) else {
                        break;
                    };
                    info!(action = %form.action, "Found terms and conditions url");
                    let url = resolve_action(&response.final_url, &form.action)?;
                    let accepted = self.session.send(HttpRequest::post(url).form(form.hidden))?;
                    info!("Accepted updated terms and conditions");
                    return Ok(accepted);
                }
                "loginAuthenticate" => {
                    warn!("Meta identitykit is loginAuthenticate");
                    if let Some((_, rest)) = response.final_url.as_str().split_once("error=") {
                        let error = rest.split('&').next().unwrap_or_default();
                        return Err(Error::Login(error.to_string()));
                    }
                }
                _ => {}
            }
        }
        Ok(response)
    }

    /// Record the identity and exchange the auth code for the primary entry.
    ///
    /// Returns the ID token to exchange for the vehicle scope.
    fn capture_identity(&mut self, terminal: &HttpResponse, pkce: &PkceChallenge) -> Result<String> {
        let mut params: BTreeMap<String, String> = terminal
            .history
            .last()
            .map(url_params)
            .unwrap_or_default();
        params.extend(url_params(&terminal.final_url));

        let user_id = params
            .get("user_id")
            .cloned()
            .ok_or_else(|| Error::Login("user id missing from login redirect".to_string()))?;
        let param = |name: &str| {
            params
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Login(format!("{name} missing from login redirect")))
        };
        let code = param("code")?;
        let kit_id_token = param("id_token")?;

        let identity = self.session.identity_mut();
        identity.profile_url = Some(PROFILE_URL.replace("{}", &user_id));
        identity.user_id = Some(user_id);
        identity.business_id = None;
        info!("Received identities");

        let url = Url::parse(&format!("{TOKEN_URL}/exchangeAuthCode"))?;
        let request = HttpRequest::post(url).form([
            ("auth_code", code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("id_token", kit_id_token.as_str()),
        ]);
        let response: TokenResponse = self.session.token_request(request)?;
        let id_token = response.id_token.clone().unwrap_or(kit_id_token);
        let now = self.session.now();
        self.session
            .install(TokenEntry::from_response(response, TokenScope::Primary, now));
        info!("Received tokens");

        Ok(id_token)
    }

    fn acquire_scopes(&mut self, id_token: &str) -> Result<()> {
        if self.session.client_id().is_none() {
            warn!("X-client-id not found. Requesting a new one");
            let client_id = self.register_client()?;
            self.session.set_client_id(client_id);
            self.session.persist_access()?;
            info!("Received X-client-id");
        }

        let vehicle = TokenScope::Vehicle;
        let response = self.session.oauth_exchange(vehicle, "id_token", id_token)?;
        let vehicle_entry = TokenEntry::from_response(response, vehicle, self.session.now());
        let bootstrap = vehicle_entry
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Login(format!("{vehicle} came without a refresh token")))?;
        self.session.install(vehicle_entry);
        info!(scope = %vehicle, "Received");

        let secondary = TokenScope::Secondary;
        let response = self
            .session
            .oauth_exchange(secondary, "refresh_token", &bootstrap)?;
        let mut secondary_entry = TokenEntry::from_response(response, secondary, self.session.now());
        if !secondary_entry.is_refreshable() {
            debug!(scope = %secondary, "No refresh token returned, keeping the {vehicle} one");
            secondary_entry.refresh_token = Some(bootstrap);
        }
        self.session.install(secondary_entry);
        info!(scope = %secondary, "Received");

        self.session.persist_cookies()?;
        debug!("Saved session");

        let business_id = self.personal_data()?.business_identifier_value;
        debug!(business_id = %business_id, "Received business identity");
        self.session.identity_mut().business_id = Some(business_id);
        self.session.persist_access()
    }

    fn register_client(&mut self) -> Result<String> {
        let body = json!({
            "appId": APP_ID,
            "appName": APP_NAME,
            "appVersion": APP_VERSION,
            "client_brand": "VW",
            "client_name": "iPhone",
            "platform": "iOS",
        });
        let request = HttpRequest::post(Url::parse(REGISTER_URL)?).json(body);
        let registration: Registration = self.session.send(request)?.error_for_status()?.json()?;
        Ok(registration.client_id)
    }

    fn personal_data(&mut self) -> Result<PersonalData> {
        let url = format!("{}/personalData", self.session.identity().profile_url()?);
        let request = HttpRequest::get(Url::parse(&url)?)
            .header(
                "Authorization",
                format!("Bearer {}", self.session.bearer(TokenScope::Primary)?),
            )
            .header("Accept", "application/json")
            .header("X-App-Version", APP_VERSION)
            .header("X-App-Name", APP_NAME)
            .header("Accept-Language", "en-US");
        self.session.send(request)?.error_for_status()?.json()
    }
}
