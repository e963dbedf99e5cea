//! Proxy lifecycle payload types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a remote actor (and therefore its local proxy) went away.
///
/// Carried in the payload of kill-proxy frames and handed to the upper
/// layer unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReason {
    /// Numeric exit code
    pub code: u32,
    /// Human-readable description
    pub message: String,
}

impl ExitReason {
    /// Create a new exit reason.
    #[must_use]
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit({}): {}", self.code, self.message)
    }
}
