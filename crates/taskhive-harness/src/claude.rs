//! Claude Code (`claude`) in one-shot print mode with streaming JSON output.

use std::sync::LazyLock;

use crate::adapter::{CliConvention, EnvVar, HarnessConfig};
use crate::inference::OutputPatterns;
use crate::types::Phase;

static PATTERNS: LazyLock<OutputPatterns> = LazyLock::new(|| {
    OutputPatterns::new()
        .with_phase(
            Phase::Analyzing,
            &[
                r#""name":"read""#,
                r#""name":"grep""#,
                r#""name":"glob""#,
                r#""name":"ls""#,
                "analyzing",
                "let me look",
                "let me examine",
            ],
        )
        .with_phase(
            Phase::Planning,
            &[r#""name":"todowrite""#, "my plan", "here's the plan", "i'll start by"],
        )
        .with_phase(
            Phase::Implementing,
            &[
                r#""name":"write""#,
                r#""name":"edit""#,
                r#""name":"multiedit""#,
                "implementing",
            ],
        )
        .with_phase(
            Phase::Testing,
            &["cargo test", "npm test", "pytest", "go test", "running tests", "run the tests"],
        )
        .with_failure_markers(&[
            "invalid api key",
            "authentication_error",
            "rate_limit_error",
            "overloaded_error",
            "credit balance is too low",
            "fatal error",
        ])
        .with_input_tokens(r#""input_tokens"\s*:\s*(\d+)"#)
        .with_output_tokens(r#""output_tokens"\s*:\s*(\d+)"#)
        .with_created(
            r#""name"\s*:\s*"Write"\s*,\s*"input"\s*:\s*\{\s*"file_path"\s*:\s*"([^"]+)""#,
        )
        .with_created(r"(?i)\b(?:created|wrote)\s+(?:file\s+)?`?([\w./-]+\.\w+)`?")
        .with_modified(
            r#""name"\s*:\s*"(?:Edit|MultiEdit)"\s*,\s*"input"\s*:\s*\{\s*"file_path"\s*:\s*"([^"]+)""#,
        )
        .with_modified(r"(?i)\b(?:modified|updated|edited)\s+(?:file\s+)?`?([\w./-]+\.\w+)`?")
        .with_deleted(r#""command"\s*:\s*"rm\s+(?:-\w+\s+)*([^"\s]+)""#)
        .with_deleted(r"(?i)\b(?:deleted|removed)\s+(?:file\s+)?`?([\w./-]+\.\w+)`?")
});

/// Invocation conventions of the Claude Code CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeCode;

impl CliConvention for ClaudeCode {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn default_binary(&self) -> &'static str {
        "claude"
    }

    fn build_args(&self, prompt: &str, config: &HarnessConfig) -> Vec<String> {
        let mut args: Vec<String> = ["--output-format", "stream-json", "--verbose"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(model) = &config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if config.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.extend(config.extra_args.iter().cloned());
        args.push("--print".to_string());
        args.push(prompt.to_string());
        args
    }

    fn env_vars(&self, config: &HarnessConfig) -> Vec<EnvVar> {
        let mut vars = Vec::new();
        if let Some(key) = &config.api_key {
            vars.push(EnvVar::new("ANTHROPIC_API_KEY", key.clone()));
        }
        if let Some(url) = &config.base_url {
            vars.push(EnvVar::forced("ANTHROPIC_BASE_URL", url.clone()));
        }
        vars
    }

    fn patterns(&self) -> &OutputPatterns {
        &PATTERNS
    }
}
