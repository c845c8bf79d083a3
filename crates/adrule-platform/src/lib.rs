pub mod error;
pub mod graph;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use error::{PlatformError, Result};

/// Delivery state the engine can request on a platform object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformStatus {
    Active,
    Paused,
}

impl PlatformStatus {
    /// Wire spelling used by the platform APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformStatus::Active => "ACTIVE",
            PlatformStatus::Paused => "PAUSED",
        }
    }
}

/// Authenticated write access to one advertising platform.
///
/// Implementations issue exactly one outbound request per call and never
/// retry; callers decide how failures are recorded.
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync {
    /// Platform name as used on rules and entities (e.g. "facebook").
    fn name(&self) -> &str;

    async fn set_status(
        &self,
        user_id: &str,
        platform_entity_id: &str,
        status: PlatformStatus,
    ) -> Result<()>;

    /// `minor_units` is the daily budget in cents (or the currency's
    /// smallest unit).
    async fn set_daily_budget(
        &self,
        user_id: &str,
        platform_entity_id: &str,
        minor_units: i64,
    ) -> Result<()>;
}

/// Supplies bearer tokens for a user's platform connection.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self, user_id: &str, platform: &str) -> Result<Option<String>>;
}

/// Converts a major-unit amount to minor units, rounding half away from zero.
///
/// # Examples
///
/// ```
/// assert_eq!(adrule_platform::to_minor_units(120.0), 12000);
/// assert_eq!(adrule_platform::to_minor_units(19.999), 2000);
/// ```
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// One `[[platforms]]` entry of the server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    /// Client implementation; only "graph" is built in.
    #[serde(default = "default_kind")]
    pub kind: String,
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_kind() -> String {
    "graph".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Build a platform client from configuration.
///
/// # Errors
///
/// Returns [`PlatformError::UnsupportedPlatform`] for an unknown `kind` and
/// [`PlatformError::Config`] when the HTTP client cannot be constructed.
pub fn build_client(
    config: &PlatformConfig,
    tokens: Arc<dyn TokenProvider>,
) -> Result<Arc<dyn PlatformClient>> {
    match config.kind.as_str() {
        "graph" => Ok(Arc::new(graph::GraphApiClient::new(config, tokens)?)),
        other => Err(PlatformError::UnsupportedPlatform(other.to_string())),
    }
}

/// Platform clients keyed by platform name.
#[derive(Default, Clone)]
pub struct PlatformRegistry {
    clients: HashMap<String, Arc<dyn PlatformClient>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one client per configured platform.
    pub fn from_configs(
        configs: &[PlatformConfig],
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(build_client(config, tokens.clone())?);
        }
        Ok(registry)
    }

    /// Registers `client` under its own name, replacing any previous entry.
    pub fn register(&mut self, client: Arc<dyn PlatformClient>) {
        let name = client.name().to_string();
        if self.clients.insert(name.clone(), client).is_some() {
            tracing::warn!(platform = %name, "Replaced existing platform client");
        }
    }

    pub fn get(&self, platform: &str) -> Result<Arc<dyn PlatformClient>> {
        self.clients
            .get(platform)
            .cloned()
            .ok_or_else(|| PlatformError::UnsupportedPlatform(platform.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullClient(&'static str);

    #[async_trait::async_trait]
    impl PlatformClient for NullClient {
        fn name(&self) -> &str {
            self.0
        }

        async fn set_status(&self, _: &str, _: &str, _: PlatformStatus) -> Result<()> {
            Ok(())
        }

        async fn set_daily_budget(&self, _: &str, _: &str, _: i64) -> Result<()> {
            Ok(())
        }
    }

    struct NoTokens;

    impl TokenProvider for NoTokens {
        fn access_token(&self, _: &str, _: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn should_round_budget_to_nearest_cent() {
        assert_eq!(to_minor_units(0.0), 0);
        assert_eq!(to_minor_units(10.004), 1000);
        assert_eq!(to_minor_units(10.006), 1001);
        assert_eq!(to_minor_units(99.99), 9999);
    }

    #[test]
    fn should_resolve_registered_clients_by_name() {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(NullClient("facebook")));
        registry.register(Arc::new(NullClient("google")));

        assert_eq!(registry.get("facebook").unwrap().name(), "facebook");
        assert_eq!(registry.names(), vec!["facebook", "google"]);
        assert!(matches!(
            registry.get("tiktok"),
            Err(PlatformError::UnsupportedPlatform(name)) if name == "tiktok"
        ));
    }

    #[test]
    fn should_reject_unknown_client_kind() {
        let config: PlatformConfig = serde_json::from_value(serde_json::json!({
            "name": "facebook",
            "kind": "soap",
            "base_url": "https://graph.example.com/v19.0"
        }))
        .unwrap();
        assert!(matches!(
            build_client(&config, Arc::new(NoTokens)),
            Err(PlatformError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn should_default_kind_and_timeout() {
        let config: PlatformConfig = serde_json::from_value(serde_json::json!({
            "name": "facebook",
            "base_url": "https://graph.example.com/v19.0"
        }))
        .unwrap();
        assert_eq!(config.kind, "graph");
        assert_eq!(config.request_timeout_secs, 30);

        let registry = PlatformRegistry::from_configs(&[config], Arc::new(NoTokens)).unwrap();
        assert_eq!(registry.names(), vec!["facebook"]);
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(PlatformStatus::Active.as_str(), "ACTIVE");
        assert_eq!(PlatformStatus::Paused.as_str(), "PAUSED");
    }
}
