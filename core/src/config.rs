use serde::{Deserialize, Serialize};
use std::env;

pub const NOTIFY_ENDPOINT_ENV: &str = "ONBOARDING_NOTIFY_ENDPOINT";
pub const NOTIFY_TOKEN_ENV: &str = "ONBOARDING_NOTIFY_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Permit the named fast-track transition that skips wire verification.
    pub allow_fast_track: bool,
    /// Couple an `investor_signed` signature to its application status step
    /// unless the caller says otherwise.
    pub auto_complete_signatures: bool,
    /// Fall back to a direct status write when the named operation fails.
    /// When false, the remote failure is returned to the caller.
    #[serde(default = "default_true")]
    pub compensate_on_remote_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Endpoint the JSON payload is posted to. Without one, events are logged.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Maximum entries in the recent-activity feed.
    pub activity_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct OnboardingConfigFile {
    workflow: WorkflowConfig,
    notifications: NotificationConfig,
    dashboard: DashboardConfig,
}

#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    pub workflow: WorkflowConfig,
    pub notifications: NotificationConfig,
    pub dashboard: DashboardConfig,
}

impl OnboardingConfig {
    /// Load from `<data_dir>/onboarding.json`, then apply environment overrides.
    /// In tests, use OnboardingConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/onboarding.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: OnboardingConfigFile = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;

        let mut config = Self {
            workflow: file.workflow,
            notifications: file.notifications,
            dashboard: file.dashboard,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(endpoint) = non_empty_env(NOTIFY_ENDPOINT_ENV) {
            self.notifications.endpoint = Some(endpoint);
        }
        if let Some(token) = non_empty_env(NOTIFY_TOKEN_ENV) {
            self.notifications.bearer_token = Some(token);
        }
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            workflow: WorkflowConfig {
                allow_fast_track: true,
                auto_complete_signatures: true,
                compensate_on_remote_failure: true,
            },
            notifications: NotificationConfig {
                enabled: true,
                endpoint: None,
                bearer_token: None,
                connect_timeout_ms: 2_000,
                request_timeout_ms: 5_000,
            },
            dashboard: DashboardConfig { activity_limit: 5 },
        }
    }
}

fn default_true() -> bool {
    true
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
