use serde::{Deserialize, Serialize};

use crate::env;

fn default_enabled() -> bool {
    true
}

/// Knobs for [`crate::displace::PartitionDataDisplacer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplacerConfig {
    /// When `false`, every `displace` call is a pass-through.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for DisplacerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

impl DisplacerConfig {
    /// Defaults with the `QDISP_DISPLACE` environment override applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(enabled) = env::displace_override() {
            config.enabled = enabled;
        }
        config
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
