#![forbid(unsafe_code)]

//! OAuth2 plumbing for the YouTube Data API: client-secret loading, consent
//! URLs, code exchange, token refresh and the on-disk token cache used by the
//! CLI.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Scope needed to read playlists and insert playlist items.
pub const YOUTUBE_FORCE_SSL_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

/// File name of the cached CLI token inside the config directory.
pub const TOKEN_CACHE_FILE: &str = "youtube-credential.json";

/// A token is treated as expired this long before its real expiry.
const EXPIRY_DELTA_SECS: i64 = 10;

/// OAuth2 token in the common `access_token`/`refresh_token`/`expiry` cache
/// layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_DELTA_SECS) <= now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// `access_type` parameter of the consent URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Used by the web flow; no refresh token is issued.
    Online,
    /// Used by the CLI so the cached token can be refreshed later.
    Offline,
}

impl AccessType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// The half of the OAuth2 flow that request handlers need.
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    fn auth_code_url(&self, state: &str, access: AccessType) -> String;

    async fn exchange(&self, code: &str) -> Result<OAuthToken>;
}

#[derive(Debug, Deserialize)]
struct CredentialSection {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    web: Option<CredentialSection>,
    installed: Option<CredentialSection>,
}

/// Google client with the authorization and token endpoints configured.
type GoogleClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Converts a token endpoint answer, keeping `previous_refresh` when Google
/// omits the refresh token (it does on refresh grants).
fn token_from_response(
    response: &BasicTokenResponse,
    issued_at: DateTime<Utc>,
    previous_refresh: Option<String>,
) -> OAuthToken {
    OAuthToken {
        access_token: response.access_token().secret().clone(),
        token_type: AsRef::<str>::as_ref(response.token_type()).to_string(),
        refresh_token: response
            .refresh_token()
            .map(|token| token.secret().clone())
            .or(previous_refresh),
        expiry: response
            .expires_in()
            .filter(|expires_in| !expires_in.is_zero())
            .and_then(|expires_in| Duration::from_std(expires_in).ok())
            .map(|expires_in| issued_at + expires_in),
    }
}

/// Agent for token requests. The token endpoint must not be followed through
/// redirects.
fn token_agent() -> ureq::Agent {
    ureq::AgentBuilder::new().redirects(0).build()
}

/// Client configuration read from a Google Cloud Console client-secret file.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Parses the `web` or `installed` section of a client-secret JSON file.
    /// The first redirect URI becomes the redirect URL.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let file: CredentialFile = serde_json::from_slice(raw)?;
        let section = file
            .web
            .or(file.installed)
            .ok_or_else(|| Error::invalid("credential file has neither a web nor an installed section"))?;
        let redirect_url = section.redirect_uris.into_iter().next().unwrap_or_default();
        Ok(Self {
            client_id: section.client_id,
            client_secret: section.client_secret,
            auth_url: section.auth_uri,
            token_url: section.token_uri,
            redirect_url,
            scopes: vec![YOUTUBE_FORCE_SSL_SCOPE.to_string()],
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)?;
        Self::from_json(&raw)
    }

    fn client(&self) -> Result<GoogleClient> {
        let auth_url = AuthUrl::new(self.auth_url.clone())
            .map_err(|err| Error::invalid(format!("auth url {}: {err}", self.auth_url)))?;
        let token_url = TokenUrl::new(self.token_url.clone())
            .map_err(|err| Error::invalid(format!("token url {}: {err}", self.token_url)))?;
        let mut client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);
        if !self.redirect_url.is_empty() {
            let redirect = RedirectUrl::new(self.redirect_url.clone()).map_err(|err| {
                Error::invalid(format!("redirect url {}: {err}", self.redirect_url))
            })?;
            client = client.set_redirect_uri(redirect);
        }
        Ok(client)
    }

    pub fn consent_url(&self, state: &str, access: AccessType) -> Result<String> {
        let state = CsrfToken::new(state.to_string());
        let (url, _) = self
            .client()?
            .authorize_url(move || state)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", access.as_str())
            .url();
        Ok(url.to_string())
    }

    /// Trades an authorization code for a token. Blocks on network I/O.
    pub fn exchange_blocking(&self, code: &str) -> Result<OAuthToken> {
        let issued_at = Utc::now();
        let response = self
            .client()?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request(&token_agent())?;
        Ok(token_from_response(&response, issued_at, None))
    }

    /// Uses the refresh token to obtain a fresh access token. Blocks on network
    /// I/O.
    pub fn refresh_blocking(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| Error::invalid("token expired and has no refresh token"))?;
        debug!("refreshing expired access token");
        let issued_at = Utc::now();
        let response = self
            .client()?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request(&token_agent())?;
        Ok(token_from_response(&response, issued_at, Some(refresh_token)))
    }
}

#[async_trait]
impl OAuthFlow for OAuthConfig {
    fn auth_code_url(&self, state: &str, access: AccessType) -> String {
        // An unparsable auth_uri leaves the link empty instead of failing the page.
        self.consent_url(state, access).unwrap_or_default()
    }

    async fn exchange(&self, code: &str) -> Result<OAuthToken> {
        let config = self.clone();
        let code = code.to_string();
        tokio::task::spawn_blocking(move || config.exchange_blocking(&code))
            .await
            .map_err(|err| Error::Task(err.to_string()))?
    }
}

/// Generates an unguessable OAuth `state` value.
pub fn generate_state() -> String {
    let mut seed = [0u8; 64];
    OsRng.fill_bytes(&mut seed);
    blake3::hash(&seed).to_hex().to_string()
}

/// Path of the cached token, creating the config directory when needed.
pub fn token_cache_file(config_dir: &Path) -> Result<PathBuf> {
    create_private_dir(config_dir)?;
    Ok(config_dir.join(TOKEN_CACHE_FILE))
}

pub fn token_from_file(path: &Path) -> Result<OAuthToken> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Writes the token as JSON into a file readable only by its owner.
pub fn save_token(path: &Path, token: &OAuthToken) -> Result<()> {
    let payload = serde_json::to_vec(token)?;
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(&payload)?;
    Ok(())
}

fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o760);
    }
    builder.create(dir)?;
    Ok(())
}
