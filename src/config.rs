//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::options::GraphOperationOptions;
use crate::Result;

/// Nesting limit for Complex-within-Complex properties.
pub const DEFAULT_MAX_COMPLEX_DEPTH: usize = 5;
/// Hop cap applied when a read asks for unbounded traversal.
pub const DEFAULT_MAX_TRAVERSAL_DEPTH: usize = 100;

/// Engine-wide limits and defaults.
///
/// ```rust
/// let config = graph_model::GraphConfig::from_json(r#"{ "max_complex_depth": 3 }"#).unwrap();
/// assert_eq!(config.max_complex_depth, 3);
/// assert_eq!(config.max_traversal_depth, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub max_complex_depth: usize,
    pub max_traversal_depth: usize,
    /// Options used by calls that pass none.
    pub default_options: GraphOperationOptions,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_complex_depth: DEFAULT_MAX_COMPLEX_DEPTH,
            max_traversal_depth: DEFAULT_MAX_TRAVERSAL_DEPTH,
            default_options: GraphOperationOptions::default(),
        }
    }
}

impl GraphConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
