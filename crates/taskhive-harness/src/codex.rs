//! OpenAI Codex CLI (`codex exec`).

use std::sync::LazyLock;

use crate::adapter::{CliConvention, EnvVar, HarnessConfig};
use crate::inference::OutputPatterns;
use crate::types::Phase;

static PATTERNS: LazyLock<OutputPatterns> = LazyLock::new(|| {
    OutputPatterns::new()
        .with_phase(Phase::Analyzing, &["thinking", "reading", "exploring", "searching"])
        .with_phase(Phase::Planning, &["update_plan", "plan updated", "my plan"])
        .with_phase(
            Phase::Implementing,
            &["apply_patch", "apply patch", "*** begin patch", "editing"],
        )
        .with_phase(
            Phase::Testing,
            &["cargo test", "npm test", "pytest", "go test", "running tests"],
        )
        .with_failure_markers(&[
            "unexpected status 401",
            "unauthorized",
            "quota exceeded",
            "rate limit reached",
            "stream error",
            "error: the argument",
        ])
        .with_input_tokens(r"(?i)input[_ ]tokens[\s:=]+([\d,]+)")
        .with_output_tokens(r"(?i)output[_ ]tokens[\s:=]+([\d,]+)")
        .with_created(r"(?m)^\s*A\s+(\S+)\s*$")
        .with_created(r"\*\*\* Add File:\s*(\S+)")
        .with_modified(r"(?m)^\s*M\s+(\S+)\s*$")
        .with_modified(r"\*\*\* Update File:\s*(\S+)")
        .with_deleted(r"(?m)^\s*D\s+(\S+)\s*$")
        .with_deleted(r"\*\*\* Delete File:\s*(\S+)")
});

/// Invocation conventions of `codex exec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codex;

impl CliConvention for Codex {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn default_binary(&self) -> &'static str {
        "codex"
    }

    fn build_args(&self, prompt: &str, config: &HarnessConfig) -> Vec<String> {
        let mut args = vec!["exec".to_string(), "--full-auto".to_string()];
        if let Some(model) = &config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(config.extra_args.iter().cloned());
        args.push(prompt.to_string());
        args
    }

    fn env_vars(&self, config: &HarnessConfig) -> Vec<EnvVar> {
        let mut vars = Vec::new();
        if let Some(key) = &config.api_key {
            vars.push(EnvVar::new("OPENAI_API_KEY", key.clone()));
        }
        if let Some(url) = &config.base_url {
            vars.push(EnvVar::forced("OPENAI_BASE_URL", url.clone()));
        }
        vars
    }

    fn patterns(&self) -> &OutputPatterns {
        &PATTERNS
    }
}
