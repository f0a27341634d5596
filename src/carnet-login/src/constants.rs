//! Constants for the carnet-login module.

/// OAuth client id registered for the We Connect app.
pub const CLIENT_ID: &str = "9496332b-ea03-4091-a224-8c746b885068@apps_vw-dilab_com";

/// Custom scheme the identity provider redirects to once login completes.
pub const CUSTOM_SCHEME: &str = "carnet";

/// Redirect URI handed to the identity provider.
pub const REDIRECT_URI: &str = "carnet://identity-kit/login";

/// Scopes requested during authorization.
pub const LOGIN_SCOPES: &str = "openid profile mbb cars birthdate nickname address phone";

/// Identity provider authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://identity.vwgroup.io/oidc/v1/authorize";

/// Token service used for the auth-code exchange and primary refresh.
pub const TOKEN_URL: &str = "https://tokenrefreshservice.apps.emea.vwapps.io";

/// Customer profile endpoint template, `{}` is the user id.
pub const PROFILE_URL: &str = "https://customer-profile.apps.emea.vwapps.io/v1/customers/{}";

/// MBB OAuth token endpoint for the scope tokens.
pub const OAUTH_URL: &str = "https://mbboauth-1d.prd.ece.vwg-connect.com/mbbcoauth/mobile/oauth2/v1/token";

/// MBB client registration endpoint.
pub const REGISTER_URL: &str = "https://mbboauth-1d.prd.ece.vwg-connect.com/mbbcoauth/mobile/register/v1";

/// Id of the login form on the identity provider pages.
pub const LOGIN_FORM_ID: &str = "emailPasswordForm";

/// App identification sent with every API call.
pub const APP_NAME: &str = "We Connect";
pub const APP_VERSION: &str = "5.8.0";
pub const APP_ID: &str = "de.volkswagen.car-net.eu.e-remote";

/// File holding the cookie jar.
pub const SESSION_FILE: &str = "session.json";

/// File holding identity, tokens and the client registration id.
pub const ACCESS_FILE: &str = "access.json";

/// User-Agent string for HTTP requests
pub const USER_AGENT: &str = concat!("carnet/", env!("CARGO_PKG_VERSION"));
