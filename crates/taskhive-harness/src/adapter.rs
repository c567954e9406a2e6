//! The harness capability interface and its command-line implementation.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::HarnessError;
use crate::inference::{OutputPatterns, ProgressTracker};
use crate::observer::ExecutionObserver;
use crate::process::{supervise, ProcessOutcome, ProcessSpec};
use crate::types::{ExecutionRequest, ExecutionResult};

/// Deadline applied when a request carries none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Time between SIGTERM and the forced kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Bound on the `--version` probe.
pub const DEFAULT_AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// An external coding agent that can be asked to carry out a task.
///
/// `execute` never fails: every problem, from a missing binary to a timeout,
/// comes back as an `ExecutionResult` with `success == false`.
#[async_trait]
pub trait HarnessAdapter: Send + Sync {
    /// Short identifier, e.g. `claude`.
    fn name(&self) -> &str;

    /// Whether the harness can be started on this machine.
    async fn is_available(&self) -> bool;

    /// Run one attempt.
    async fn execute(
        &self,
        request: &ExecutionRequest,
        observer: Arc<dyn ExecutionObserver>,
    ) -> ExecutionResult;
}

/// Settings shared by all command-line harnesses.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Binary path or name; the harness default when unset.
    pub binary: Option<String>,

    pub model: Option<String>,

    /// Provider credential exported to the child.
    pub api_key: Option<String>,

    /// Environment variable that receives `api_key`, when the harness
    /// supports more than one provider.
    pub api_key_env: Option<String>,

    /// Provider endpoint override. Always wins over the caller environment.
    pub base_url: Option<String>,

    /// Appended after the harness's own flags, before the prompt.
    pub extra_args: Vec<String>,

    /// Let the harness act without interactive permission prompts.
    pub skip_permissions: bool,

    pub default_timeout: Duration,
    pub grace_period: Duration,
    pub availability_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            binary: None,
            model: None,
            api_key: None,
            api_key_env: None,
            base_url: None,
            extra_args: Vec::new(),
            skip_permissions: true,
            default_timeout: DEFAULT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            availability_timeout: DEFAULT_AVAILABILITY_TIMEOUT,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_availability_timeout(mut self, timeout: Duration) -> Self {
        self.availability_timeout = timeout;
        self
    }
}

/// An environment variable to export to the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
    /// Export even if the caller environment already defines `key`.
    pub force: bool,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            force: false,
        }
    }

    pub fn forced(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            force: true,
            ..Self::new(key, value)
        }
    }
}

/// Drop variables the caller already set, unless forced.
pub fn resolve_env<F>(vars: Vec<EnvVar>, is_set: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> bool,
{
    vars.into_iter()
        .filter(|var| {
            let keep = var.force || !is_set(&var.key);
            if !keep {
                debug!(key = %var.key, "Keeping caller-provided environment variable");
            }
            keep
        })
        .map(|var| (var.key, var.value))
        .collect()
}

/// How one command-line agent is invoked and how its output reads.
pub trait CliConvention: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn default_binary(&self) -> &'static str;

    /// Full argument list for one run, prompt included.
    fn build_args(&self, prompt: &str, config: &HarnessConfig) -> Vec<String>;

    /// Credentials and endpoint overrides.
    fn env_vars(&self, config: &HarnessConfig) -> Vec<EnvVar>;

    fn patterns(&self) -> &OutputPatterns;
}

/// A [`HarnessAdapter`] that drives a command-line agent.
#[derive(Debug, Clone)]
pub struct CliAdapter<C> {
    convention: C,
    config: HarnessConfig,
}

impl<C: CliConvention> CliAdapter<C> {
    pub fn new(convention: C, config: HarnessConfig) -> Self {
        Self { convention, config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn binary(&self) -> &str {
        self.config
            .binary
            .as_deref()
            .unwrap_or_else(|| self.convention.default_binary())
    }

    /// The process that `execute` would start for `request`.
    pub fn process_spec(&self, request: &ExecutionRequest) -> ProcessSpec {
        let prompt = request.render_prompt();
        let env = resolve_env(self.convention.env_vars(&self.config), |key| {
            std::env::var_os(key).is_some()
        });
        ProcessSpec {
            program: self.binary().to_string(),
            args: self.convention.build_args(&prompt, &self.config),
            working_dir: request.working_dir.clone(),
            env,
            timeout: request
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.config.default_timeout),
            grace_period: self.config.grace_period,
        }
    }

    fn classify(&self, outcome: &ProcessOutcome, timeout: Duration) -> Option<HarnessError> {
        if outcome.timed_out {
            return Some(HarnessError::TimedOut {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        match outcome.exit_code {
            Some(0) => {}
            Some(code) => {
                return Some(HarnessError::NonZeroExit {
                    code,
                    detail: last_line(&outcome.stderr).unwrap_or("no stderr output").to_string(),
                })
            }
            None => {
                return Some(HarnessError::NonZeroExit {
                    code: -1,
                    detail: "terminated by signal".to_string(),
                })
            }
        }
        self.convention
            .patterns()
            .find_failure(&outcome.stderr)
            .map(|marker| {
                let detail = outcome
                    .stderr
                    .lines()
                    .find(|line| line.to_lowercase().contains(marker))
                    .unwrap_or(marker);
                HarnessError::FailureSignal(truncate(detail.trim(), 500))
            })
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl<C: CliConvention> HarnessAdapter for CliAdapter<C> {
    fn name(&self) -> &str {
        self.convention.name()
    }

    async fn is_available(&self) -> bool {
        let binary = self.binary();
        let mut cmd = Command::new(binary);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.config.availability_timeout, cmd.status()).await {
            Ok(Ok(status)) => {
                debug!(
                    harness = self.name(),
                    %binary,
                    success = status.success(),
                    "Version probe finished"
                );
                status.success()
            }
            Ok(Err(e)) => {
                debug!(harness = self.name(), %binary, error = %e, "Version probe failed to start");
                false
            }
            Err(_) => {
                warn!(harness = self.name(), %binary, "Version probe timed out");
                false
            }
        }
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        observer: Arc<dyn ExecutionObserver>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let spec = self.process_spec(request);
        let patterns = self.convention.patterns();

        info!(
            harness = self.name(),
            binary = %spec.program,
            working_dir = %spec.working_dir.display(),
            timeout_ms = spec.timeout.as_millis() as u64,
            messages = request.messages.len(),
            "Starting harness execution"
        );

        let mut tracker = ProgressTracker::new();
        let outcome = match supervise(&spec, observer.as_ref(), patterns, &mut tracker).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(harness = self.name(), error = %e, "Harness execution failed");
                return ExecutionResult::failure(e.to_string(), elapsed_ms(started));
            }
        };

        let failure = self.classify(&outcome, spec.timeout);
        let token_usage =
            patterns.extract_token_usage(&format!("{}\n{}", outcome.stdout, outcome.stderr));
        let files = patterns.extract_file_changes(&outcome.stdout);

        match &failure {
            None => {
                if let Some(event) = tracker.complete() {
                    observer.on_progress(event).await;
                }
                info!(
                    harness = self.name(),
                    duration_ms = elapsed_ms(started),
                    files_created = files.created.len(),
                    files_modified = files.modified.len(),
                    files_deleted = files.deleted.len(),
                    "Harness execution succeeded"
                );
            }
            Some(e) => {
                warn!(harness = self.name(), error = %e, "Harness execution unsuccessful");
            }
        }

        ExecutionResult {
            success: failure.is_none(),
            output: outcome.stdout,
            files_created: files.created,
            files_modified: files.modified,
            files_deleted: files.deleted,
            token_usage,
            duration_ms: elapsed_ms(started),
            error: failure.map(|e| e.to_string()),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, Phase};

    /// Runs `sh -c <script>`; the prompt lands in `$1`.
    struct Shell {
        script: &'static str,
        patterns: OutputPatterns,
    }

    impl Shell {
        fn new(script: &'static str) -> Self {
            Self {
                script,
                patterns: OutputPatterns::new()
                    .with_phase(Phase::Implementing, &["writing"])
                    .with_failure_markers(&["invalid api key"])
                    .with_input_tokens(r"input_tokens=(\d+)")
                    .with_output_tokens(r"output_tokens=(\d+)")
                    .with_created(r"created (\S+)"),
            }
        }
    }

    impl CliConvention for Shell {
        fn name(&self) -> &'static str {
            "shell"
        }

        fn default_binary(&self) -> &'static str {
            "sh"
        }

        fn build_args(&self, prompt: &str, config: &HarnessConfig) -> Vec<String> {
            let mut args = vec!["-c".to_string(), self.script.to_string(), "sh".to_string()];
            args.extend(config.extra_args.iter().cloned());
            args.push(prompt.to_string());
            args
        }

        fn env_vars(&self, config: &HarnessConfig) -> Vec<EnvVar> {
            config
                .api_key
                .iter()
                .map(|key| EnvVar::new("TASKHIVE_TEST_KEY", key.clone()))
                .collect()
        }

        fn patterns(&self) -> &OutputPatterns {
            &self.patterns
        }
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest::new("system", std::env::temp_dir())
            .with_message(ChatMessage::user("do the thing"))
    }

    #[test]
    fn test_resolve_env_respects_caller_environment() {
        let vars = vec![
            EnvVar::new("API_KEY", "from-config"),
            EnvVar::forced("BASE_URL", "http://localhost:8080"),
            EnvVar::new("OTHER", "x"),
        ];
        let resolved = resolve_env(vars, |key| key == "API_KEY" || key == "BASE_URL");
        assert_eq!(
            resolved,
            vec![
                ("BASE_URL".to_string(), "http://localhost:8080".to_string()),
                ("OTHER".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_process_spec_uses_request_timeout() {
        let adapter = CliAdapter::new(Shell::new("true"), HarnessConfig::default());
        let spec = adapter.process_spec(&request().with_timeout_ms(1500));
        assert_eq!(spec.timeout, Duration::from_millis(1500));
        assert_eq!(spec.program, "sh");
        assert_eq!(spec.args.last().unwrap(), "system\n\n## User\ndo the thing");

        let spec = adapter.process_spec(&request());
        assert_eq!(spec.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_binary_override() {
        let adapter = CliAdapter::new(
            Shell::new("true"),
            HarnessConfig::new().with_binary("/bin/sh"),
        );
        assert_eq!(adapter.binary(), "/bin/sh");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_collects_details() {
        let adapter = CliAdapter::new(
            Shell::new(
                "echo 'writing code'; echo 'created src/new.rs'; \
                 echo 'input_tokens=12 output_tokens=34'",
            ),
            HarnessConfig::default(),
        );
        let (observer, mut rx) = crate::observer::ChannelObserver::new();
        let result = adapter.execute(&request(), Arc::new(observer)).await;

        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert!(result.error.is_none());
        assert_eq!(result.files_created, vec!["src/new.rs"]);
        let usage = result.token_usage.unwrap();
        assert_eq!((usage.input_tokens, usage.output_tokens), (12, 34));

        let mut last_percent = 0;
        while let Ok(event) = rx.try_recv() {
            if let crate::observer::ExecutionEvent::Progress(p) = event {
                assert!(p.percent >= last_percent);
                last_percent = p.percent;
            }
        }
        assert_eq!(last_percent, 100);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_binary_output_does_not_fail_the_run() {
        let adapter = CliAdapter::new(
            Shell::new(
                "printf 'start\\n\\377\\376 binary\\n'; sleep 0.3; \
                 echo 'created src/after.rs'; exit 0",
            ),
            HarnessConfig::default(),
        );
        let result = adapter
            .execute(&request(), Arc::new(crate::observer::NoopObserver))
            .await;

        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert!(result.output.contains("created src/after.rs"));
        assert_eq!(result.files_created, vec!["src/after.rs"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let adapter = CliAdapter::new(
            Shell::new("echo partial; echo 'boom' >&2; exit 2"),
            HarnessConfig::default(),
        );
        let result = adapter
            .execute(&request(), Arc::new(crate::observer::NoopObserver))
            .await;

        assert!(!result.success);
        assert_eq!(result.output, "partial\n");
        let error = result.error.unwrap();
        assert!(error.contains("code 2"), "{}", error);
        assert!(error.contains("boom"), "{}", error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_vocabulary_overrides_zero_exit() {
        let adapter = CliAdapter::new(
            Shell::new("echo 'Error: Invalid API key' >&2; exit 0"),
            HarnessConfig::default(),
        );
        let result = adapter
            .execute(&request(), Arc::new(crate::observer::NoopObserver))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid API key"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kill_reports_failure() {
        let adapter = CliAdapter::new(
            Shell::new("trap '' TERM; exec sleep 30"),
            HarnessConfig::new().with_grace_period(Duration::from_millis(200)),
        );
        let started = Instant::now();
        let result = adapter
            .execute(
                &request().with_timeout_ms(200),
                Arc::new(crate::observer::NoopObserver),
            )
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_is_exported_to_child() {
        let adapter = CliAdapter::new(
            Shell::new("echo \"key=$TASKHIVE_TEST_KEY\""),
            HarnessConfig::new().with_api_key("secret"),
        );
        let result = adapter
            .execute(&request(), Arc::new(crate::observer::NoopObserver))
            .await;
        assert_eq!(result.output, "key=secret\n");
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable_and_fails() {
        let adapter = CliAdapter::new(
            Shell::new("true"),
            HarnessConfig::new().with_binary("taskhive-definitely-not-installed"),
        );
        assert!(!adapter.is_available().await);

        let result = adapter
            .execute(&request(), Arc::new(crate::observer::NoopObserver))
            .await;
        assert!(!result.success);
        assert!(result
            .error
            .unwrap()
            .contains("Failed to spawn harness 'taskhive-definitely-not-installed'"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_available_when_version_succeeds() {
        let adapter = CliAdapter::new(
            Shell::new("true"),
            HarnessConfig::new().with_binary("true"),
        );
        assert!(adapter.is_available().await);
    }
}
