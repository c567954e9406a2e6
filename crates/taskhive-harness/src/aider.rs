//! Aider in non-interactive `--message` mode.

use std::sync::LazyLock;

use crate::adapter::{CliConvention, EnvVar, HarnessConfig};
use crate::inference::OutputPatterns;
use crate::types::Phase;

static PATTERNS: LazyLock<OutputPatterns> = LazyLock::new(|| {
    OutputPatterns::new()
        .with_phase(Phase::Analyzing, &["repo-map", "to the chat", "scanning repo"])
        .with_phase(Phase::Planning, &["plan:", "here's the plan", "steps:"])
        .with_phase(
            Phase::Implementing,
            &["applied edit to", "creating empty file", "<<<<<<< search"],
        )
        .with_phase(
            Phase::Testing,
            &["running tests", "pytest", "cargo test", "npm test", "go test"],
        )
        .with_failure_markers(&[
            "litellm.authenticationerror",
            "litellm.ratelimiterror",
            "litellm.apierror",
            "litellm.notfounderror",
            "api key not found",
        ])
        .with_input_tokens(r"(?i)tokens:\s*([\d.,]+[km]?)\s+sent")
        .with_output_tokens(r"(?i)([\d.,]+[km]?)\s+received")
        .with_created(r"(?m)Creating empty file\s+(\S+)")
        .with_modified(r"(?m)Applied edit to\s+(\S+)")
        .with_deleted(r"(?i)\b(?:deleted|removed)\s+file\s+(\S+)")
});

/// Invocation conventions of the `aider` CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aider;

impl Aider {
    /// The variable that receives the configured key.
    ///
    /// An explicit `api_key_env` wins; otherwise OpenAI-family models use
    /// `OPENAI_API_KEY` and everything else `ANTHROPIC_API_KEY`.
    pub fn key_variable(config: &HarnessConfig) -> String {
        if let Some(var) = &config.api_key_env {
            return var.clone();
        }
        let openai = config.model.as_deref().is_some_and(|model| {
            let model = model.to_ascii_lowercase();
            ["gpt", "o1", "o3", "o4", "openai/"]
                .iter()
                .any(|prefix| model.starts_with(prefix))
        });
        if openai {
            "OPENAI_API_KEY".to_string()
        } else {
            "ANTHROPIC_API_KEY".to_string()
        }
    }
}

impl CliConvention for Aider {
    fn name(&self) -> &'static str {
        "aider"
    }

    fn default_binary(&self) -> &'static str {
        "aider"
    }

    fn build_args(&self, prompt: &str, config: &HarnessConfig) -> Vec<String> {
        let mut args: Vec<String> = ["--yes-always", "--no-auto-commits", "--no-pretty"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(model) = &config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(config.extra_args.iter().cloned());
        args.push("--message".to_string());
        args.push(prompt.to_string());
        args
    }

    fn env_vars(&self, config: &HarnessConfig) -> Vec<EnvVar> {
        let key_var = Self::key_variable(config);
        let url_var = if key_var == "OPENAI_API_KEY" {
            "OPENAI_API_BASE"
        } else {
            "ANTHROPIC_BASE_URL"
        };

        let mut vars = Vec::new();
        if let Some(key) = &config.api_key {
            vars.push(EnvVar::new(key_var, key.clone()));
        }
        if let Some(url) = &config.base_url {
            vars.push(EnvVar::forced(url_var, url.clone()));
        }
        vars
    }

    fn patterns(&self) -> &OutputPatterns {
        &PATTERNS
    }
}
