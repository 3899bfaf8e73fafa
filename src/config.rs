use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    /// Base URL of the external tax registry (`API_URL`).
    pub registry_api_url: String,
    /// Bearer key sent to the registry (`API_KEY`).
    pub registry_api_key: String,
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    /// Allowed CORS origin; permissive CORS when unset.
    pub front_url: Option<String>,
    /// Role name given to self-registered users.
    pub default_role: String,
    pub cookie_secure: bool,
}

const MIN_JWT_SECRET_LEN: usize = 32;

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn optional_number<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", name)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            db_max_connections: optional_number("DB_MAX_CONNECTIONS", 10)?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            registry_api_url: required("API_URL").and_then(|raw| {
                let parsed = url::Url::parse(&raw)
                    .map_err(|e| anyhow::anyhow!("API_URL is not a valid URL: {}", e))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    anyhow::bail!("API_URL must start with http:// or https://");
                }
                Ok(raw.trim_end_matches('/').to_string())
            })?,
            registry_api_key: required("API_KEY")?,
            jwt_secret: required("JWT_SECRET").and_then(|secret| {
                if secret.len() < MIN_JWT_SECRET_LEN {
                    anyhow::bail!("JWT_SECRET must be at least {} bytes", MIN_JWT_SECRET_LEN);
                }
                Ok(secret)
            })?,
            access_token_ttl_minutes: optional_number("JWT_ACCESS_TTL_MINUTES", 15)?,
            refresh_token_ttl_days: optional_number("JWT_REFRESH_TTL_DAYS", 7)?,
            front_url: std::env::var("FRONT_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            default_role: std::env::var("DEFAULT_ROLE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "user".to_string()),
            cookie_secure: std::env::var("COOKIE_SECURE")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        // Never log secrets or the full connection string
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            config.database_url.chars().take(20).collect::<String>()
        );
        tracing::debug!("Registry API URL: {}", config.registry_api_url);
        if let Some(ref origin) = config.front_url {
            tracing::info!("CORS origin configured: {}", origin);
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
