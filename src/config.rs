//! Pipeline configuration.
//!
//! Defaults match the public-dataset walkthrough: items need at least 15
//! group memberships, groups keep between 2 and 100 items, no negative
//! sampling, 100 embedding factors.
//!
//! ```
//! use fast_cooc::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(r#"{"min_item_frequency": 5}"#).unwrap();
//! assert_eq!(config.min_item_frequency, 5);
//! assert_eq!(config.max_group_size, 100);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PipelineError, Result};

pub const DEFAULT_MIN_ITEM_FREQUENCY: u64 = 15;
pub const DEFAULT_MAX_GROUP_SIZE: usize = 100;
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 100;

/// Smallest group that can produce a pair.
pub const MIN_GROUP_SIZE: usize = 2;

/// What cosine similarity returns when either vector is all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroNormPolicy {
    /// Similarity is 0.0.
    #[default]
    Zero,
    /// Fail with [`PipelineError::ZeroNorm`].
    Fail,
}

/// Settings for the co-occurrence engine and the similarity explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Minimum number of memberships for an item to be kept.
    pub min_item_frequency: u64,
    /// Largest group (by distinct items) that is kept.
    pub max_group_size: usize,
    /// Number of top-frequency items to pair up as negative samples. 0 disables.
    pub negative_sample_size: usize,
    /// Dimensionality of the exported factor vectors.
    pub embedding_dimensions: usize,
    pub zero_norm: ZeroNormPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_item_frequency: DEFAULT_MIN_ITEM_FREQUENCY,
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
            negative_sample_size: 0,
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            zero_norm: ZeroNormPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_min_item_frequency(mut self, value: u64) -> Self {
        self.min_item_frequency = value;
        self
    }

    #[must_use]
    pub fn with_max_group_size(mut self, value: usize) -> Self {
        self.max_group_size = value;
        self
    }

    #[must_use]
    pub fn with_negative_sample_size(mut self, value: usize) -> Self {
        self.negative_sample_size = value;
        self
    }

    #[must_use]
    pub fn with_embedding_dimensions(mut self, value: usize) -> Self {
        self.embedding_dimensions = value;
        self
    }

    #[must_use]
    pub fn with_zero_norm(mut self, policy: ZeroNormPolicy) -> Self {
        self.zero_norm = policy;
        self
    }

    /// Reject settings that cannot produce a meaningful run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when `min_item_frequency < 1`,
    /// `max_group_size < 2` or `embedding_dimensions < 1`.
    pub fn validate(&self) -> Result<()> {
        if self.min_item_frequency < 1 {
            return Err(PipelineError::invalid_config(
                "min_item_frequency",
                format!("must be at least 1, got {}", self.min_item_frequency),
            ));
        }
        if self.max_group_size < MIN_GROUP_SIZE {
            return Err(PipelineError::invalid_config(
                "max_group_size",
                format!(
                    "must be at least {MIN_GROUP_SIZE}, got {}",
                    self.max_group_size
                ),
            ));
        }
        if self.embedding_dimensions < 1 {
            return Err(PipelineError::invalid_config(
                "embedding_dimensions",
                "must be at least 1, got 0",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
