use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::requests::{Category, DocumentRoots};
use crate::storage::absolute_dir;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub document_roots: DocumentRoots,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "exam-requests".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "exam-requests-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let document_roots = document_roots_from_env()?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            cors_allowed_origin,
            document_roots,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn document_roots_from_env() -> Result<DocumentRoots> {
    document_roots_from(|key| env::var(key).ok())
}

/// Uploads root plus one root per category; each may be overridden individually and relative
/// paths are resolved against the working directory.
fn document_roots_from(lookup: impl Fn(&str) -> Option<String>) -> Result<DocumentRoots> {
    let uploads = absolute_dir(lookup("UPLOADS_DIR").unwrap_or_else(|| "uploads".to_string()))?;
    let base = PathBuf::from(lookup("DOCUMENTS_BASE_DIR").unwrap_or_else(|| "database".to_string()));

    let mut categories = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        let key = format!("DOCUMENTS_DIR_{}", category.env_suffix());
        let dir = match lookup(&key) {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
            _ => base.join(category.default_dir_name()),
        };
        categories.push((category, absolute_dir(dir)?));
    }

    Ok(DocumentRoots {
        uploads,
        categories,
    })
}

/// Masks the password of a connection URL for logging. URLs without a password are shown as
/// they are; anything unparseable is hidden entirely.
fn redact_database_url(raw: &str) -> String {
    const MASK: &str = "*****";
    let Ok(mut parsed) = Url::parse(raw) else {
        return "***".to_string();
    };
    if parsed.password().is_none() {
        return parsed.to_string();
    }
    match parsed.set_password(Some(MASK)) {
        Ok(()) => parsed.to_string(),
        Err(()) => "***".to_string(),
    }
}
