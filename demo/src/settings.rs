//! Host settings
//!
//! One file configures the whole demo. Engine keys sit at the top level and
//! are read by [`EngineConfig::from_file`]; the host-only `[telemetry]` table
//! and `[[users]]` seed list are read here from the same file.

use std::path::Path;

use anyhow::Context;
use gatehouse_auth::{EngineConfig, MemoryBackend};
use gatehouse_telemetry::TelemetryConfig;
use serde::Deserialize;

/// A user written into the in-memory backend at startup
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub routes: Vec<String>,
}

/// Settings the engine itself does not read
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub telemetry: TelemetryConfig,
    pub users: Vec<SeedUser>,
}

/// Everything the host needs to start
#[derive(Debug)]
pub struct Settings {
    pub engine: EngineConfig,
    pub host: HostSettings,
}

impl Settings {
    /// Load from a config file, or from `GATEHOUSE_*` variables alone
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self {
                engine: EngineConfig::from_env().context("reading GATEHOUSE_* variables")?,
                host: HostSettings::default(),
            });
        };

        let engine = EngineConfig::from_file(path)
            .with_context(|| format!("loading engine config from {}", path.display()))?;
        let host: HostSettings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("loading host settings from {}", path.display()))?;

        Ok(Self { engine, host })
    }

    /// Write the seed users into a fresh backend
    pub async fn seed_backend(&self) -> anyhow::Result<MemoryBackend> {
        let backend = MemoryBackend::new();
        for user in &self.host.users {
            let routes: Vec<&str> = user.routes.iter().map(String::as_str).collect();
            backend
                .put_user(&user.username, &user.password, &routes)
                .await
                .with_context(|| format!("seeding user {}", user.username))?;
        }
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
secret = "demo_signing_secret_at_least_32_bytes_long"
issuer = "https://auth.example.com"
session_ttl_secs = 600

[telemetry]
json_logs = false
log_level = "debug"

[[users]]
username = "alice"
password = "wonderland"
routes = ["example.com/admin/*"]
"#;

    #[tokio::test]
    async fn test_single_file_feeds_engine_and_host() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.engine.session_ttl_secs, 600);
        assert_eq!(settings.engine.issuer, "https://auth.example.com");
        assert!(!settings.host.telemetry.json_logs);
        assert_eq!(settings.host.users.len(), 1);

        let backend = settings.seed_backend().await.unwrap();
        assert!(
            gatehouse_auth::UserBackend::get(&backend, "user:alice")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = Settings::load(Some(Path::new("/nonexistent/gatehouse.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }
}
