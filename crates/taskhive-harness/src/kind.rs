//! Harness selection by name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::adapter::{CliAdapter, CliConvention, HarnessAdapter, HarnessConfig};
use crate::aider::Aider;
use crate::claude::ClaudeCode;
use crate::codex::Codex;
use crate::error::HarnessError;

/// The supported command-line agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HarnessKind {
    #[default]
    Claude,
    Codex,
    Aider,
}

impl HarnessKind {
    pub const ALL: [HarnessKind; 3] = [Self::Claude, Self::Codex, Self::Aider];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Aider => "aider",
        }
    }

    pub fn default_binary(&self) -> &'static str {
        match self {
            Self::Claude => ClaudeCode.default_binary(),
            Self::Codex => Codex.default_binary(),
            Self::Aider => Aider.default_binary(),
        }
    }

    /// Construct the adapter for this harness.
    pub fn build(self, config: HarnessConfig) -> Arc<dyn HarnessAdapter> {
        match self {
            Self::Claude => Arc::new(CliAdapter::new(ClaudeCode, config)),
            Self::Codex => Arc::new(CliAdapter::new(Codex, config)),
            Self::Aider => Arc::new(CliAdapter::new(Aider, config)),
        }
    }
}

impl fmt::Display for HarnessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HarnessKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "claude-code" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "aider" => Ok(Self::Aider),
            _ => Err(HarnessError::UnknownHarness(s.to_string())),
        }
    }
}
