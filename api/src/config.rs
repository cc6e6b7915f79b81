//! Process configuration read from environment variables
//!
//! Optional integrations (Google sign-in, SMTP, Stripe) are `None` when their
//! variables are absent; the rest of the app degrades instead of refusing to
//! start.

use std::path::PathBuf;

use crate::constants::{DEFAULT_HANDLE_SWEEP_CRON, DEFAULT_METRICS_REFRESH_CRON};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
            SameSite::None => "None",
        }
    }

    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => SameSite::None,
            "strict" => SameSite::Strict,
            _ => SameSite::Lax,
        }
    }
}

/// Attributes applied to session cookies
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local(PathBuf),
    Gcs { bucket: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub frontend_url: String,
    pub public_api_url: String,
    pub jwt_cookie_secret: Vec<u8>,
    pub jwt_bearer_secret: Vec<u8>,
    pub twitter_bearer_token: Option<String>,
    pub google: Option<GoogleConfig>,
    pub smtp: Option<SmtpConfig>,
    pub mail_from: String,
    pub stripe: Option<StripeConfig>,
    pub storage: StorageConfig,
    pub handle_sweep_cron: String,
    pub metrics_refresh_cron: String,
    pub cors_origins: Vec<String>,
    pub cookies: CookieSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(p) => p.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                reason: format!("not a port number: {p}"),
            })?,
            None => 3000,
        };

        let database_url = get("DATABASE_URL");
        let store_backend = match get("STORE_BACKEND").as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("postgres") | None => StoreBackend::Postgres,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    reason: format!("expected postgres or memory, got {other}"),
                });
            }
        };
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_cookie_secret = get("JWT_COOKIE_SECRET").ok_or(ConfigError::Missing("JWT_COOKIE_SECRET"))?;
        let jwt_bearer_secret = get("JWT_BEARER_SECRET").ok_or(ConfigError::Missing("JWT_BEARER_SECRET"))?;
        if jwt_cookie_secret == jwt_bearer_secret {
            return Err(ConfigError::Invalid {
                name: "JWT_BEARER_SECRET",
                reason: "must differ from JWT_COOKIE_SECRET".into(),
            });
        }

        let google = match (
            get("GOOGLE_CLIENT_ID"),
            get("GOOGLE_CLIENT_SECRET"),
            get("GOOGLE_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => None,
        };

        let smtp = match get("SMTP_HOST") {
            Some(host) => {
                let port = match get("SMTP_PORT") {
                    Some(p) => p.parse().map_err(|_| ConfigError::Invalid {
                        name: "SMTP_PORT",
                        reason: format!("not a port number: {p}"),
                    })?,
                    None => 587,
                };
                Some(SmtpConfig {
                    host,
                    port,
                    username: get("SMTP_USERNAME"),
                    password: get("SMTP_PASSWORD"),
                })
            }
            None => None,
        };

        let stripe = match (get("STRIPE_SECRET_KEY"), get("STRIPE_WEBHOOK_SECRET")) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
            }),
            _ => None,
        };

        let storage = match get("GCS_BUCKET_NAME") {
            Some(bucket) if get("LOCAL_STORAGE_PATH").is_none() => StorageConfig::Gcs { bucket },
            _ => StorageConfig::Local(PathBuf::from(
                get("LOCAL_STORAGE_PATH").unwrap_or_else(|| "./media".to_string()),
            )),
        };

        let cors_origins = get("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let frontend_url = get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".to_string());
        let public_api_url =
            get("PUBLIC_API_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        Ok(Config {
            port,
            database_url,
            store_backend,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            public_api_url: public_api_url.trim_end_matches('/').to_string(),
            jwt_cookie_secret: jwt_cookie_secret.into_bytes(),
            jwt_bearer_secret: jwt_bearer_secret.into_bytes(),
            twitter_bearer_token: get("TWITTER_BEARER_TOKEN"),
            google,
            smtp,
            mail_from: get("MAIL_FROM")
                .unwrap_or_else(|| "Wall of Love <no-reply@wall-of-love.local>".to_string()),
            stripe,
            storage,
            handle_sweep_cron: get("HANDLE_SWEEP_CRON")
                .unwrap_or_else(|| DEFAULT_HANDLE_SWEEP_CRON.to_string()),
            metrics_refresh_cron: get("METRICS_REFRESH_CRON")
                .unwrap_or_else(|| DEFAULT_METRICS_REFRESH_CRON.to_string()),
            cors_origins,
            cookies: CookieSettings {
                secure: get("ENV").as_deref() == Some("prod"),
                same_site: get("COOKIE_SAMESITE")
                    .map(|v| SameSite::parse(&v))
                    .unwrap_or(SameSite::Lax),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_memory_config() {
        let config = Config::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_COOKIE_SECRET", "cookie"),
            ("JWT_BEARER_SECRET", "bearer"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.google.is_none());
        assert!(config.smtp.is_none());
        assert!(config.stripe.is_none());
        assert!(matches!(config.storage, StorageConfig::Local(_)));
        assert_eq!(config.handle_sweep_cron, DEFAULT_HANDLE_SWEEP_CRON);
        assert!(!config.cookies.secure);
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = Config::from_lookup(lookup(&[
            ("JWT_COOKIE_SECRET", "cookie"),
            ("JWT_BEARER_SECRET", "bearer"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_secrets_must_differ() {
        let err = Config::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_COOKIE_SECRET", "same"),
            ("JWT_BEARER_SECRET", "same"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_BEARER_SECRET", .. }));
    }

    #[test]
    fn test_prod_cookies_and_origins() {
        let config = Config::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_COOKIE_SECRET", "cookie"),
            ("JWT_BEARER_SECRET", "bearer"),
            ("ENV", "prod"),
            ("COOKIE_SAMESITE", "none"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("GCS_BUCKET_NAME", "walls"),
        ]))
        .unwrap();
        assert!(config.cookies.secure);
        assert_eq!(config.cookies.same_site, SameSite::None);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert!(matches!(config.storage, StorageConfig::Gcs { ref bucket } if bucket == "walls"));
    }
}
