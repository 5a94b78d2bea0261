//! Run configuration: credentials, endpoint, VM definition and timing.
//!
//! Credentials come from the process boundary (the binary reads them from
//! the environment) and are turned into a [`Credentials`] value here; the
//! core never looks at the environment itself.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LifecycleError;
use crate::lifecycle::LifecycleConfig;
use crate::poll::PollPolicy;
use crate::vm::{Template, VmSpec};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "EXOSCALE_API_KEY";

/// Environment variable holding the API secret.
pub const API_SECRET_ENV: &str = "EXOSCALE_API_SECRET";

/// Default compute API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.exoscale.ch/compute";

/// API key and secret. Both are opaque and passed through to the provider.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Build credentials from optional values; empty counts as missing.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Config`] naming every missing variable.
    pub fn from_parts(
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Result<Self, LifecycleError> {
        let api_key = api_key.filter(|v| !v.trim().is_empty());
        let api_secret = api_secret.filter(|v| !v.trim().is_empty());

        match (api_key, api_secret) {
            (Some(api_key), Some(api_secret)) => Ok(Self {
                api_key,
                api_secret,
            }),
            (key, secret) => {
                let missing: Vec<&str> = [
                    key.is_none().then_some(API_KEY_ENV),
                    secret.is_none().then_some(API_SECRET_ENV),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(LifecycleError::Config(format!(
                    "missing credentials: {}",
                    missing.join(", ")
                )))
            }
        }
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Usage text printed when credentials are missing.
    #[must_use]
    pub fn usage() -> String {
        format!("Environment variables\n\t{API_KEY_ENV}\n\t{API_SECRET_ENV}\nmust be set")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Poll budget as written in a run file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

impl From<PollSettings> for PollPolicy {
    fn from(settings: PollSettings) -> Self {
        PollPolicy::new(settings.max_attempts, Duration::from_secs(settings.interval_secs))
    }
}

/// Optional fixed waits after lifecycle steps, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettleSettings {
    pub post_create_secs: u64,
    pub post_start_secs: u64,
    pub post_halt_secs: u64,
}

/// Template as written in a run file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSettings {
    pub name: String,
    pub storage_gb: u32,
    /// Defaults to the run zone.
    #[serde(default)]
    pub zone: Option<String>,
}

/// Everything one lifecycle run needs besides credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub endpoint: String,
    pub name: String,
    pub zone: String,
    pub template: TemplateSettings,
    pub offering: String,
    pub security_groups: Vec<String>,
    pub keypair: Option<String>,
    pub user_data: Option<String>,
    pub creation_poll: PollSettings,
    pub transition_poll: PollSettings,
    pub settle: SettleSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            name: "lifecycle-demo".to_string(),
            zone: "ch-dk-2".to_string(),
            template: TemplateSettings {
                name: "Linux Ubuntu 16.04 LTS 64-bit".to_string(),
                storage_gb: 10,
                zone: None,
            },
            offering: "Micro".to_string(),
            security_groups: vec!["default".to_string(), "second sg".to_string()],
            keypair: Some("first".to_string()),
            user_data: Some(
                "#cloud-config\nmanage_etc_hosts: true\nfqdn: new.host\n".to_string(),
            ),
            creation_poll: PollSettings {
                max_attempts: 60,
                interval_secs: 5,
            },
            transition_poll: PollSettings {
                max_attempts: 36,
                interval_secs: 5,
            },
            settle: SettleSettings::default(),
        }
    }
}

impl RunConfig {
    /// Parse a YAML run definition. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Config`] if the document is malformed.
    pub fn from_yaml(content: &str) -> Result<Self, LifecycleError> {
        serde_yaml::from_str(content)
            .map_err(|e| LifecycleError::Config(format!("invalid run file: {e}")))
    }

    /// Load a YAML run definition from disk.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, LifecycleError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LifecycleError::Config(format!("cannot read run file {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&content)?;
        info!(path = %path.display(), vm = %config.name, "Loaded run file");
        Ok(config)
    }

    /// Desired VM configuration.
    #[must_use]
    pub fn vm_spec(&self) -> VmSpec {
        VmSpec {
            name: self.name.clone(),
            template: Template {
                name: self.template.name.clone(),
                storage_gb: self.template.storage_gb,
                zone: self
                    .template
                    .zone
                    .clone()
                    .unwrap_or_else(|| self.zone.clone()),
            },
            offering: self.offering.clone(),
            security_groups: self.security_groups.clone(),
            keypair: self.keypair.clone().filter(|k| !k.is_empty()),
            user_data: self.user_data.clone().filter(|u| !u.is_empty()),
            zone: self.zone.clone(),
        }
    }

    /// Timing configuration for the orchestrator.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Config`] if a poll budget is empty.
    pub fn lifecycle_config(&self) -> Result<LifecycleConfig, LifecycleError> {
        let config = LifecycleConfig {
            creation_poll: self.creation_poll.into(),
            transition_poll: self.transition_poll.into(),
            post_create_settle: Duration::from_secs(self.settle.post_create_secs),
            post_start_settle: Duration::from_secs(self.settle.post_start_secs),
            post_halt_settle: Duration::from_secs(self.settle.post_halt_secs),
        };
        config.validate()?;
        Ok(config)
    }
}
