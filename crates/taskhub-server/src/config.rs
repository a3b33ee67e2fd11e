use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use taskhub_types::models::TaskAccessPolicy;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub task_access: TaskAccessPolicy,
    /// External relay to publish notifications to; the built-in gateway is
    /// used when unset.
    pub notifier_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("TASKHUB_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TASKHUB_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let db_path = lookup("TASKHUB_DB_PATH").unwrap_or_else(|| "taskhub.db".into());
        let host = lookup("TASKHUB_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("TASKHUB_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("TASKHUB_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let task_access = match lookup("TASKHUB_TASK_ACCESS") {
            Some(raw) => raw
                .parse::<TaskAccessPolicy>()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("TASKHUB_TASK_ACCESS")?,
            None => TaskAccessPolicy::default(),
        };

        let notifier_url = lookup("TASKHUB_NOTIFIER_URL").filter(|url| !url.trim().is_empty());

        Ok(Self {
            jwt_secret,
            db_path: db_path.into(),
            addr,
            task_access,
            notifier_url,
        })
    }
}
