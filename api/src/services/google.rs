//! Google OAuth 2 (authorization code + PKCE) sign-in

use base64::Engine;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::GoogleConfig;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Google API error: {0}")]
    Api(String),
}

/// What the caller must persist until the callback arrives
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUser {
    /// Stable account id
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Clone)]
pub struct GoogleClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: Client,
}

impl GoogleClient {
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            http: Client::new(),
        }
    }

    /// PKCE code verifier and its S256 challenge
    fn generate_pkce() -> (String, String) {
        let verifier_bytes: [u8; 32] = rand::rng().random();
        let code_verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(verifier_bytes);

        let hash = Sha256::digest(code_verifier.as_bytes());
        let code_challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash);

        (code_verifier, code_challenge)
    }

    fn generate_state() -> String {
        let bytes: [u8; 16] = rand::rng().random();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn authorize_url(&self) -> AuthorizeRequest {
        let state = Self::generate_state();
        let (code_verifier, code_challenge) = Self::generate_pkce();

        let url = format!(
            "{AUTHORIZE_URL}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256&access_type=online&prompt=select_account",
            percent_encode(&self.client_id),
            percent_encode(&self.redirect_uri),
            percent_encode(SCOPES),
            percent_encode(&state),
            percent_encode(&code_challenge),
        );

        AuthorizeRequest {
            url,
            state,
            code_verifier,
        }
    }

    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, GoogleError> {
        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("code_verifier", code_verifier),
        ];

        let resp = self.http.post(TOKEN_URL).form(&params).send().await?;
        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(GoogleError::Api(text));
        }
        Ok(resp.json().await?)
    }

    pub async fn user_info(&self, access_token: &str) -> Result<GoogleUser, GoogleError> {
        let resp = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(GoogleError::Api(text));
        }
        Ok(resp.json().await?)
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}
