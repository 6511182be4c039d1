// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of nest-exporter.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! OAuth2 credentials for the SDM API
//!
//! The exporter runs as an installed application: the client secret file comes
//! from the Google Cloud console, and the authorized-user credentials (refresh
//! token plus the last access token) are stored next to the user's home
//! directory after the first console authorization.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{SdmError, SdmResult};
use crate::types::{TokenErrorResponse, TokenResponse};

pub const SDM_SCOPE: &str = "https://www.googleapis.com/auth/sdm.service";
pub const DEFAULT_CREDENTIALS_FILE: &str = ".nest-metrics-credentials.json";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

// Refresh this long before the access token actually expires
const EXPIRY_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Supplies bearer tokens for SDM calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> SdmResult<String>;
}

/// Fixed token, for tests and for tokens minted outside the exporter
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> SdmResult<String> {
        Ok(self.0.clone())
    }
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_owned()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

/// Installed-app client secret downloaded from the cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn from_json(json: &str) -> SdmResult<Self> {
        let file: ClientSecretFile = serde_json::from_str(json)?;
        file.installed.or(file.web).ok_or_else(|| {
            SdmError::ConfigError(
                "client secret has neither an 'installed' nor a 'web' section".to_owned(),
            )
        })
    }

    pub fn from_file(path: &Path) -> SdmResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SdmError::ConfigError(format!(
                "Failed to read client secret {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map_or(OOB_REDIRECT_URI, String::as_str)
    }

    /// Consent page the user opens to obtain an authorization code
    pub fn authorization_url(&self) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline&prompt=consent",
            self.auth_uri,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(self.redirect_uri()),
            urlencoding::encode(SDM_SCOPE),
        )
    }
}

/// Persisted credentials of the authorized user
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl AuthorizedUser {
    pub fn load(path: &Path) -> SdmResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write the credentials readable by the owner only
    pub fn save(&self, path: &Path) -> SdmResult<()> {
        let json = serde_json::to_string_pretty(self)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Current access token unless it expires within the safety margin
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.token, self.expiry) {
            (Some(token), Some(expiry))
                if now + TimeDelta::seconds(EXPIRY_MARGIN_SECS) < expiry =>
            {
                Some(token)
            }
            _ => None,
        }
    }

    fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        self.token = Some(response.access_token);
        // Absurd lifetimes saturate instead of overflowing the timestamp
        self.expiry = Some(
            TimeDelta::try_seconds(lifetime)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = refresh_token;
        }
    }
}

/// `~/.nest-metrics-credentials.json`, or the bare file name without `$HOME`
pub fn default_credentials_path() -> PathBuf {
    std::env::var_os("HOME").map_or_else(
        || PathBuf::from(DEFAULT_CREDENTIALS_FILE),
        |home| PathBuf::from(home).join(DEFAULT_CREDENTIALS_FILE),
    )
}

async fn request_token(
    http: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> SdmResult<TokenResponse> {
    let response = http.post(token_uri).form(form).send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<TokenResponse>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<TokenErrorResponse>(&body)
        .map(|e| match e.error_description {
            Some(description) => format!("{}: {description}", e.error),
            None => e.error,
        })
        .unwrap_or(body);

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SdmError::AuthenticationFailed(reason))
        }
        status => Err(SdmError::ApiError {
            status: status.as_u16(),
            message: reason,
        }),
    }
}

/// Exchange an authorization code for the first set of credentials
pub async fn exchange_code(
    http: &Client,
    secret: &ClientSecret,
    code: &str,
) -> SdmResult<AuthorizedUser> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", secret.client_id.as_str()),
        ("client_secret", secret.client_secret.as_str()),
        ("redirect_uri", secret.redirect_uri()),
    ];
    let response = request_token(http, &secret.token_uri, &form).await?;
    let refresh_token = response.refresh_token.clone().ok_or_else(|| {
        SdmError::AuthenticationFailed("token response carried no refresh token".to_owned())
    })?;

    let mut user = AuthorizedUser {
        client_id: secret.client_id.clone(),
        client_secret: secret.client_secret.clone(),
        refresh_token,
        token: None,
        expiry: None,
        token_uri: secret.token_uri.clone(),
        scopes: vec![SDM_SCOPE.to_owned()],
    };
    user.apply(response, Utc::now());
    Ok(user)
}

fn prompt_for_code(secret: &ClientSecret) -> SdmResult<String> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(
        out,
        "Please visit this URL to authorize this application:\n\n{}\n",
        secret.authorization_url()
    )?;
    write!(out, "Enter the authorization code: ")?;
    out.flush()?;

    let mut code = String::new();
    std::io::stdin().lock().read_line(&mut code)?;
    let code = code.trim();
    if code.is_empty() {
        return Err(SdmError::AuthenticationFailed(
            "no authorization code entered".to_owned(),
        ));
    }
    Ok(code.to_owned())
}

/// Refresh-token backed provider that keeps the credential file up to date
pub struct OAuthTokenProvider {
    http: Client,
    credentials_path: PathBuf,
    user: Mutex<AuthorizedUser>,
}

impl fmt::Debug for OAuthTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokenProvider")
            .field("credentials_path", &self.credentials_path)
            .finish_non_exhaustive()
    }
}

impl OAuthTokenProvider {
    pub fn new(http: Client, user: AuthorizedUser, credentials_path: PathBuf) -> Self {
        Self {
            http,
            credentials_path,
            user: Mutex::new(user),
        }
    }

    /// Load stored credentials, or run the console authorization flow once
    pub async fn load_or_authorize(
        http: Client,
        client_secret_path: &Path,
        credentials_path: PathBuf,
    ) -> SdmResult<Self> {
        if credentials_path.exists() {
            info!(path = %credentials_path.display(), "Loading stored credentials");
            let user = AuthorizedUser::load(&credentials_path)?;
            return Ok(Self::new(http, user, credentials_path));
        }

        let secret = ClientSecret::from_file(client_secret_path)?;
        let prompt_secret = secret.clone();
        let code = tokio::task::spawn_blocking(move || prompt_for_code(&prompt_secret))
            .await
            .map_err(|e| SdmError::ConfigError(format!("authorization prompt failed: {e}")))??;

        let user = exchange_code(&http, &secret, &code).await?;
        user.save(&credentials_path)?;
        info!(path = %credentials_path.display(), "Stored new credentials");
        Ok(Self::new(http, user, credentials_path))
    }

    async fn refresh(&self, user: &mut AuthorizedUser) -> SdmResult<()> {
        debug!("Refreshing access token");
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", user.refresh_token.as_str()),
            ("client_id", user.client_id.as_str()),
            ("client_secret", user.client_secret.as_str()),
        ];
        let response = request_token(&self.http, &user.token_uri, &form).await?;
        user.apply(response, Utc::now());

        if let Err(e) = user.save(&self.credentials_path) {
            warn!(error = %e, "Failed to persist refreshed credentials");
        }
        Ok(())
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self) -> SdmResult<String> {
        let mut user = self.user.lock().await;
        if let Some(token) = user.valid_token(Utc::now()) {
            return Ok(token.to_owned());
        }

        self.refresh(&mut user).await?;
        user.token.clone().ok_or_else(|| {
            SdmError::AuthenticationFailed("token refresh produced no access token".to_owned())
        })
    }
}
