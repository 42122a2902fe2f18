use std::env;

use serde::Serialize;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Environment variables the suite requires, in declaration order.
pub const REQUIRED_VARS: &[&str] = &[
    "TEST_DATABASE",
    "APP_ID",
    "APP_KEY",
    "TENANT_ID",
    "ENGINE_CONNECTION_STRING",
    "DM_CONNECTION_STRING",
];

/// Outcome of loading the suite configuration.
///
/// `Skipped` is a first-class signal, distinct from both success and
/// failure: the suite must not run, and must not be reported as broken.
#[derive(Debug, Clone)]
pub enum ConfigCheck {
    Ready(SuiteConfig),
    Skipped { missing: Vec<String> },
}

impl ConfigCheck {
    pub fn ready(self) -> Option<SuiteConfig> {
        match self {
            ConfigCheck::Ready(cfg) => Some(cfg),
            ConfigCheck::Skipped { .. } => None,
        }
    }
}

/// Suite connection settings: one AAD-style application credential shared by
/// the engine endpoint (queries, management) and the data-management
/// endpoint (batched ingestion).
#[derive(Debug, Clone, Serialize)]
pub struct SuiteConfig {
    /// Target database the suite creates its table in.
    pub database: String,
    /// Application (client) id used for both endpoints.
    pub app_id: String,
    /// Application secret. Never logged.
    #[serde(skip_serializing)]
    pub app_key: String,
    /// AAD tenant the application lives in.
    pub tenant_id: String,
    /// Engine endpoint: queries and management commands.
    pub engine_endpoint: String,
    /// Data-management endpoint: batched ingestion submission.
    pub dm_endpoint: String,
}

impl SuiteConfig {
    /// Build from process environment (call `load_dotenv()` first).
    pub fn from_env() -> ConfigCheck {
        Self::from_lookup(env_opt)
    }

    /// Build from an injected lookup. Tests use this to avoid mutating
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigCheck {
        let missing: Vec<String> = REQUIRED_VARS
            .iter()
            .filter(|key| lookup(key).is_none())
            .map(|key| key.to_string())
            .collect();

        if !missing.is_empty() {
            return ConfigCheck::Skipped { missing };
        }

        let fetch = |key: &str| lookup(key).unwrap_or_default();
        ConfigCheck::Ready(SuiteConfig {
            database: fetch("TEST_DATABASE"),
            app_id: fetch("APP_ID"),
            app_key: fetch("APP_KEY"),
            tenant_id: fetch("TENANT_ID"),
            engine_endpoint: fetch("ENGINE_CONNECTION_STRING"),
            dm_endpoint: fetch("DM_CONNECTION_STRING"),
        })
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Suite config loaded:");
        tracing::info!("  database: {}", self.database);
        tracing::info!("  app_id:   {}", self.app_id);
        tracing::info!("  tenant:   {}", self.tenant_id);
        tracing::info!("  engine:   {}", self.engine_endpoint);
        tracing::info!("  dm:       {}", self.dm_endpoint);
    }
}
