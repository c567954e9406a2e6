//! Request/result contract shared by every harness.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Speaker of a message in the task history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("User"),
            Self::Assistant => f.write_str("Assistant"),
        }
    }
}

/// One entry of the task's message history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything a harness needs for one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Directive placed ahead of the message history.
    pub system_prompt: String,

    /// Ordered message history.
    pub messages: Vec<ChatMessage>,

    /// Directory the harness runs in.
    pub working_dir: PathBuf,

    /// Deadline override; the adapter default applies when unset.
    pub timeout_ms: Option<u64>,
}

impl ExecutionRequest {
    pub fn new(system_prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
            working_dir: working_dir.into(),
            timeout_ms: None,
        }
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// System directive followed by the message history, one heading per
    /// message.
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::new();
        let system = self.system_prompt.trim();
        if !system.is_empty() {
            prompt.push_str(system);
        }
        for message in &self.messages {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str(&format!("## {}\n{}", message.role, message.content.trim()));
        }
        prompt
    }
}

/// Token counters scraped from harness output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Outcome of one execution attempt. Always produced, even on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    /// Captured stdout.
    pub output: String,

    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_deleted: Vec<String>,

    pub token_usage: Option<TokenUsage>,

    pub duration_ms: u64,

    /// Set when `success` is false.
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A failed result with no captured output.
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            duration_ms,
            ..Self::default()
        }
    }
}

/// Coarse execution phase inferred from output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyzing,
    Planning,
    Implementing,
    Testing,
    Complete,
}

impl Phase {
    pub fn percent(&self) -> u8 {
        match self {
            Self::Analyzing => 20,
            Self::Planning => 40,
            Self::Implementing => 60,
            Self::Testing => 80,
            Self::Complete => 100,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Analyzing => "analyzing",
            Self::Planning => "planning",
            Self::Implementing => "implementing",
            Self::Testing => "testing",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Advisory progress notification. Never a correctness signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent: phase.percent(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_prompt_concatenates_history() {
        let request = ExecutionRequest::new("You are a careful engineer.", ".")
            .with_message(ChatMessage::user("Add a README"))
            .with_message(ChatMessage::assistant("Which sections?"))
            .with_message(ChatMessage::user("Install and usage"));

        let prompt = request.render_prompt();
        assert!(prompt.starts_with("You are a careful engineer.\n\n## User\nAdd a README"));
        assert!(prompt.contains("## Assistant\nWhich sections?"));
        assert!(prompt.ends_with("## User\nInstall and usage"));
    }

    #[test]
    fn test_render_prompt_without_system() {
        let request = ExecutionRequest::new("  ", ".").with_message(ChatMessage::user("hi"));
        assert_eq!(request.render_prompt(), "## User\nhi");
    }

    #[test]
    fn test_phase_percentages_increase() {
        let phases = [
            Phase::Analyzing,
            Phase::Planning,
            Phase::Implementing,
            Phase::Testing,
            Phase::Complete,
        ];
        let percents: Vec<u8> = phases.iter().map(Phase::percent).collect();
        assert_eq!(percents, vec![20, 40, 60, 80, 100]);
    }
}
