//! Bundler-related primitives

use serde::{Deserialize, Serialize};

/// Bundling modes of the bundler
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundlingMode {
    /// Sends bundles automatically every x seconds
    Auto,
    /// Sends bundles upon debug request
    Manual,
}
