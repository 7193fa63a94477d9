//! Gmail OAuth2 authentication
//!
//! Implements the credential provider: reuse a persisted credential while it
//! is valid, refresh it once expired, and fall back to the OAuth2
//! authorization code flow with a local callback listener otherwise.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::GmailCredentials;

/// Name of the persisted credential in the config directory
const TOKEN_FILE: &str = "token.json";

/// Access tokens closer than this to expiry are treated as expired
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Authorized-user credential, persisted between runs
///
/// Field names follow Google's authorized-user JSON so an existing
/// `token.json` can be reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Current access token
    pub token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// When `token` stops being accepted
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    GmailAuth::TOKEN_URL.to_string()
}

impl Credential {
    /// The bearer token to send with API requests
    pub fn access_token(&self) -> &str {
        &self.token
    }

    /// Whether the access token can still be used at `now`
    ///
    /// A credential without an expiry never expires.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_none_or(|expiry| expiry > now + Duration::seconds(EXPIRY_BUFFER_SECS))
    }

    /// Build a credential from a token endpoint response
    ///
    /// Refresh responses usually omit the refresh token; `previous_refresh`
    /// is kept in that case.
    fn from_token_response(
        response: TokenResponse,
        client: &GmailCredentials,
        token_uri: &str,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => vec![GmailAuth::GMAIL_READONLY_SCOPE.to_string()],
        };

        Self {
            token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            token_uri: token_uri.to_string(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes,
            expiry: response
                .expires_in
                .map(|secs| now + Duration::seconds(secs as i64)),
        }
    }
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
    #[allow(dead_code)]
    token_type: String,
}

/// Query parameters Google sends back to the redirect URI
#[derive(Debug, Default, PartialEq)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

/// Load a persisted credential
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_credential(path: &Path) -> Result<Option<Credential>> {
    if !path.exists() {
        return Ok(None);
    }
    config::load_json_file(path).map(Some)
}

/// Persist a credential, creating parent directories as needed
pub fn save_credential(path: &Path, credential: &Credential) -> Result<()> {
    config::save_json_file(path, credential)
}

/// OAuth2 credential provider for Gmail
pub struct GmailAuth {
    client_secret_path: PathBuf,
    token_path: PathBuf,
}

impl GmailAuth {
    /// Gmail API OAuth2 endpoints
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Read-only access is all a tally needs
    pub const GMAIL_READONLY_SCOPE: &'static str =
        "https://www.googleapis.com/auth/gmail.readonly";

    /// Create a new GmailAuth instance
    ///
    /// # Arguments
    /// * `client_secret_path` - OAuth client registration, read only for interactive login
    /// * `token_path` - Where the authorized-user credential is persisted
    pub fn new(client_secret_path: PathBuf, token_path: PathBuf) -> Self {
        Self {
            client_secret_path,
            token_path,
        }
    }

    /// Get the default token storage path (~/.config/spamcount/token.json)
    pub fn default_token_path() -> Result<PathBuf> {
        config::config_path(TOKEN_FILE).context("Could not determine config directory")
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Get a valid credential, refreshing or re-authenticating as needed
    ///
    /// The refreshed or newly obtained credential is written back to the
    /// token path so later runs can skip the browser.
    pub fn obtain_credential(&self) -> Result<Credential> {
        if let Some(credential) = load_credential(&self.token_path)? {
            if credential.is_valid_at(Utc::now()) {
                debug!("Using stored credential from {}", self.token_path.display());
                return Ok(credential);
            }

            if let Some(refresh_token) = credential.refresh_token.clone() {
                info!("Access token expired, refreshing");
                let refreshed = self.refresh_credential(&credential, refresh_token)?;
                save_credential(&self.token_path, &refreshed)?;
                return Ok(refreshed);
            }
        }

        // Need to authenticate from scratch
        let client = GmailCredentials::load(&self.client_secret_path)?;
        let credential = self.authorization_code_auth(&client)?;
        save_credential(&self.token_path, &credential)?;
        Ok(credential)
    }

    /// Build the consent page URL for `redirect_uri`
    fn authorization_url(client: &GmailCredentials, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&client.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(Self::GMAIL_READONLY_SCOPE),
        )
    }

    /// Perform authorization code flow authentication
    fn authorization_code_auth(&self, client: &GmailCredentials) -> Result<Credential> {
        // Step 1: Start local server to receive callback
        let listener =
            TcpListener::bind("127.0.0.1:0").context("Failed to bind local callback listener")?;
        let port = listener
            .local_addr()
            .context("Failed to read callback listener address")?
            .port();
        let redirect_uri = format!("http://localhost:{}", port);

        // Step 2: Build authorization URL
        let auth_url = Self::authorization_url(client, &redirect_uri);

        println!("\n=== Gmail Authentication Required ===");
        println!("Opening browser for authentication...");
        println!("If the browser doesn't open, visit: {}", auth_url);

        if let Err(e) = open::that(&auth_url) {
            eprintln!("Failed to open browser: {}. Please open the URL manually.", e);
        }

        // Step 3: Wait for callback with authorization code
        println!("Waiting for authorization...");
        let code = Self::wait_for_callback(listener)?;

        // Step 4: Exchange code for tokens
        println!("Exchanging authorization code for tokens...");
        let mut response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("code", code.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .context("Failed to exchange authorization code")?;

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")?;

        println!("Authentication successful!\n");
        Ok(Credential::from_token_response(
            token,
            client,
            Self::TOKEN_URL,
            None,
            Utc::now(),
        ))
    }

    /// Wait for OAuth callback and extract authorization code
    fn wait_for_callback(listener: TcpListener) -> Result<String> {
        let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader
            .read_line(&mut request_line)
            .context("Failed to read request")?;

        let params = parse_callback(&request_line);

        let (status, body) = if params.code.is_some() {
            ("200 OK", "Authentication successful! You can close this window.")
        } else {
            ("400 Bad Request", "Authentication failed. Please try again.")
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
            status, body
        );
        stream.write_all(response.as_bytes()).ok();

        if let Some(err) = params.error {
            anyhow::bail!("OAuth error: {}", err);
        }

        params.code.context("No authorization code received")
    }

    /// Exchange a refresh token for a new access token
    fn refresh_credential(
        &self,
        credential: &Credential,
        refresh_token: String,
    ) -> Result<Credential> {
        let response = ureq::post(&credential.token_uri)
            .send_form([
                ("client_id", credential.client_id.as_str()),
                ("client_secret", credential.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let token: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        let client = GmailCredentials {
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
        };

        Ok(Credential::from_token_response(
            token,
            &client,
            &credential.token_uri,
            Some(refresh_token),
            Utc::now(),
        ))
    }

    /// Clear the stored credential (logout)
    pub fn logout(&self) -> Result<()> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path).with_context(|| {
                format!("Failed to remove credential: {}", self.token_path.display())
            })?;
        }
        Ok(())
    }
}

/// Pull `code` and `error` out of a request line like
/// `GET /?code=AUTH_CODE&scope=... HTTP/1.1`
fn parse_callback(request_line: &str) -> CallbackParams {
    let mut params = CallbackParams::default();

    let Some(target) = request_line.split_whitespace().nth(1) else {
        return params;
    };
    let Ok(url) = Url::parse("http://localhost").and_then(|base| base.join(target)) else {
        return params;
    };

    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    params
}
