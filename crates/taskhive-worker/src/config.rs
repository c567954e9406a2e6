//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use taskhive_core::WorkerId;
use taskhive_harness::{HarnessConfig, HarnessKind};
use taskhive_store::LockConfig;

/// Default location of the record store, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = ".taskhive/queue.jsonl";

/// Directive placed ahead of every task.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous software engineer working \
through a shared task queue. Complete the task below inside the current working directory. \
Make the smallest change that fully solves it, keep the project building, and run the \
relevant tests before you finish.";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Record store file shared by all workers.
    pub store_path: PathBuf,

    pub worker_id: WorkerId,

    /// Directory the harness runs in.
    pub working_dir: PathBuf,

    pub system_prompt: String,

    /// Execution deadline handed to the harness with every request.
    pub execution_timeout: Duration,

    /// Sleep between claim attempts when idle or contended.
    pub poll_interval: Duration,

    pub lock: LockConfig,

    /// Attempts at reporting an outcome before giving up on lock contention.
    pub report_attempts: u32,

    /// Stop once a claim pass finds nothing to do.
    pub once: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            worker_id: WorkerId::generate(),
            working_dir: PathBuf::from("."),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            execution_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(10),
            lock: LockConfig::default(),
            report_attempts: 5,
            once: false,
        }
    }
}

impl Config {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            ..Self::default()
        }
    }

    pub fn with_worker_id(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_report_attempts(mut self, attempts: u32) -> Self {
        self.report_attempts = attempts.max(1);
        self
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }
}

/// TaskHive worker - claims queued work items and runs them through a coding agent
#[derive(Debug, Parser)]
#[command(name = "taskhive-worker")]
#[command(about = "Claim work from a shared queue file and execute it", long_about = None)]
pub struct Cli {
    /// Record store file
    #[arg(short, long, default_value = DEFAULT_STORE_PATH)]
    pub store: PathBuf,

    /// Worker identity (generated from the process id when omitted)
    #[arg(short, long)]
    pub worker_id: Option<String>,

    /// Harness to run: claude, codex, or aider
    #[arg(long, default_value = "claude")]
    pub harness: HarnessKind,

    /// Harness binary override
    #[arg(long)]
    pub harness_bin: Option<String>,

    /// Model passed to the harness
    #[arg(short, long)]
    pub model: Option<String>,

    /// Working directory for executions
    #[arg(short = 'd', long, default_value = ".")]
    pub workdir: PathBuf,

    /// Execution deadline in seconds
    #[arg(long, default_value_t = 1800)]
    pub timeout_secs: u64,

    /// Seconds between SIGTERM and kill after the deadline
    #[arg(long, default_value_t = 5)]
    pub grace_secs: u64,

    /// Idle poll interval in seconds
    #[arg(long, default_value_t = 10)]
    pub poll_secs: u64,

    /// Age in seconds after which a lock token is considered abandoned
    #[arg(long, default_value_t = 30)]
    pub lock_stale_secs: u64,

    /// System directive placed before each task
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Provider API key exported to the harness
    #[arg(long)]
    pub api_key: Option<String>,

    /// Exit when no claimable work remains
    #[arg(long)]
    pub once: bool,

    /// Emit JSON Lines events on stdout
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Split the command line into worker and harness configuration.
    pub fn into_config(self) -> (Config, HarnessKind, HarnessConfig) {
        let worker_id = self
            .worker_id
            .map(WorkerId::new)
            .unwrap_or_else(WorkerId::generate);

        let config = Config::new(self.store)
            .with_worker_id(worker_id)
            .with_working_dir(self.workdir)
            .with_system_prompt(
                self.system_prompt
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            )
            .with_execution_timeout(Duration::from_secs(self.timeout_secs))
            .with_poll_interval(Duration::from_secs(self.poll_secs))
            .with_lock(
                LockConfig::default().with_stale_after(Duration::from_secs(self.lock_stale_secs)),
            )
            .with_once(self.once);

        let mut harness = HarnessConfig::new()
            .with_default_timeout(config.execution_timeout)
            .with_grace_period(Duration::from_secs(self.grace_secs));
        if let Some(binary) = self.harness_bin {
            harness = harness.with_binary(binary);
        }
        if let Some(model) = self.model {
            harness = harness.with_model(model);
        }
        if let Some(key) = self.api_key {
            harness = harness.with_api_key(key);
        }

        (config, self.harness, harness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store_path, PathBuf::from(".taskhive/queue.jsonl"));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.execution_timeout, Duration::from_secs(1800));
        assert_eq!(config.report_attempts, 5);
        assert!(config.worker_id.as_str().starts_with("worker-"));
        assert!(!config.once);
    }

    #[test]
    fn test_cli_mapping() {
        let cli = Cli::parse_from([
            "taskhive-worker",
            "--store",
            "/tmp/q.jsonl",
            "--worker-id",
            "w-1",
            "--harness",
            "aider",
            "--model",
            "gpt-4o",
            "--timeout-secs",
            "60",
            "--grace-secs",
            "2",
            "--poll-secs",
            "1",
            "--lock-stale-secs",
            "45",
            "--once",
        ]);
        let (config, kind, harness) = cli.into_config();

        assert_eq!(config.store_path, PathBuf::from("/tmp/q.jsonl"));
        assert_eq!(config.worker_id.as_str(), "w-1");
        assert_eq!(config.execution_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.lock.stale_after, Duration::from_secs(45));
        assert!(config.once);

        assert_eq!(kind, HarnessKind::Aider);
        assert_eq!(harness.model.as_deref(), Some("gpt-4o"));
        assert_eq!(harness.grace_period, Duration::from_secs(2));
        assert_eq!(harness.default_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_cli_rejects_unknown_harness() {
        let result = Cli::try_parse_from(["taskhive-worker", "--harness", "cursor"]);
        assert!(result.is_err());
    }
}
