use serde::{Deserialize, Serialize};

const DEFAULT_FILL_SEED: u64 = 0x5eed;

/// Reference CPU backend settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefCpuConfig {
    /// Base seed for argument filling; every kernel argument derives its own stream from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for RefCpuConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

impl RefCpuConfig {
    /// Default config with `QDISP_FILL_SEED` applied when set (decimal or `0x` hex).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(seed) = qdisp::env::env_u64("QDISP_FILL_SEED") {
            config.seed = seed;
        }
        config
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

fn default_seed() -> u64 {
    DEFAULT_FILL_SEED
}
