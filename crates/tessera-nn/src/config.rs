//! JSON configuration for building an `Embed` layer.
//!
//! ```json
//! { "nO": 64, "nV": 5000, "column": 0,
//!   "initializer": { "kind": "uniform", "lo": -0.1, "hi": 0.1, "seed": 0 } }
//! ```
//!
//! Every field is optional. Unknown fields are rejected.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_core::{Result, TesseraError};

use crate::{Embed, GlorotUniformInit, Initializer, NormalInit, UniformInit, ZeroInit};

fn default_lo() -> f32 {
    -0.1
}

fn default_hi() -> f32 {
    0.1
}

fn default_std() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum InitializerConfig {
    Uniform {
        #[serde(default = "default_lo")]
        lo: f32,
        #[serde(default = "default_hi")]
        hi: f32,
        #[serde(default)]
        seed: Option<u64>,
    },
    Normal {
        #[serde(default)]
        mean: f32,
        #[serde(default = "default_std")]
        std: f32,
        #[serde(default)]
        seed: Option<u64>,
    },
    GlorotUniform {
        #[serde(default)]
        seed: Option<u64>,
    },
    Zeros,
}

impl Default for InitializerConfig {
    fn default() -> Self {
        InitializerConfig::Uniform {
            lo: default_lo(),
            hi: default_hi(),
            seed: None,
        }
    }
}

impl InitializerConfig {
    pub fn build(&self) -> Arc<dyn Initializer> {
        match *self {
            InitializerConfig::Uniform { lo, hi, seed } => {
                Arc::new(UniformInit { lo, hi, seed })
            }
            InitializerConfig::Normal { mean, std, seed } => {
                Arc::new(NormalInit { mean, std, seed })
            }
            InitializerConfig::GlorotUniform { seed } => Arc::new(GlorotUniformInit { seed }),
            InitializerConfig::Zeros => Arc::new(ZeroInit),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbedConfig {
    #[serde(rename = "nO", default)]
    pub n_o: Option<usize>,
    #[serde(rename = "nV", default)]
    pub n_v: Option<usize>,
    #[serde(default)]
    pub column: usize,
    #[serde(default)]
    pub initializer: InitializerConfig,
}

impl EmbedConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| TesseraError::InvalidArgument(format!("embed config: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Build an uninitialized layer.
    pub fn build(&self) -> Embed {
        Embed::new()
            .n_o(self.n_o)
            .n_v(self.n_v)
            .column(self.column)
            .shared_initializer(self.initializer.build())
    }
}
