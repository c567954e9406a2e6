//! Heuristic inference over free-text harness output.
//!
//! Nothing here parses a grammar. Each harness supplies keyword lists and
//! regexes that match its usual phrasing, and the results are advisory:
//! progress, token counts, and file lists may be incomplete or wrong without
//! affecting whether an attempt counts as a success.

use regex::Regex;

use crate::types::{Phase, ProgressEvent, TokenUsage};

/// Pattern set describing one harness's output conventions.
#[derive(Debug, Clone, Default)]
pub struct OutputPatterns {
    /// Lowercase keywords per phase.
    phase_markers: Vec<(Phase, Vec<&'static str>)>,
    /// Lowercase stderr substrings that mark a failed run.
    failure_markers: Vec<&'static str>,
    input_tokens: Vec<Regex>,
    output_tokens: Vec<Regex>,
    created: Vec<Regex>,
    modified: Vec<Regex>,
    deleted: Vec<Regex>,
}

/// Paths mentioned in output, grouped by the verb that introduced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChanges {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

fn compile(pattern: &str) -> Regex {
    // Patterns are compile-time literals owned by the harness modules.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid output pattern {:?}: {}", pattern, e))
}

impl OutputPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keywords (matched case-insensitively) that indicate `phase`.
    pub fn with_phase(mut self, phase: Phase, markers: &[&'static str]) -> Self {
        self.phase_markers.push((phase, markers.to_vec()));
        self
    }

    /// Stderr substrings (matched case-insensitively) that mark failure.
    pub fn with_failure_markers(mut self, markers: &[&'static str]) -> Self {
        self.failure_markers.extend_from_slice(markers);
        self
    }

    /// Regex whose first capture group is an input token count.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is not a valid regex.
    pub fn with_input_tokens(mut self, pattern: &str) -> Self {
        self.input_tokens.push(compile(pattern));
        self
    }

    /// Regex whose first capture group is an output token count.
    pub fn with_output_tokens(mut self, pattern: &str) -> Self {
        self.output_tokens.push(compile(pattern));
        self
    }

    /// Regex whose first capture group is a created path.
    pub fn with_created(mut self, pattern: &str) -> Self {
        self.created.push(compile(pattern));
        self
    }

    /// Regex whose first capture group is a modified path.
    pub fn with_modified(mut self, pattern: &str) -> Self {
        self.modified.push(compile(pattern));
        self
    }

    /// Regex whose first capture group is a deleted path.
    pub fn with_deleted(mut self, pattern: &str) -> Self {
        self.deleted.push(compile(pattern));
        self
    }

    /// Highest phase whose markers appear in `line`.
    pub fn detect_phase(&self, line: &str) -> Option<Phase> {
        let lower = line.to_lowercase();
        self.phase_markers
            .iter()
            .filter(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
            .map(|(phase, _)| *phase)
            .max()
    }

    /// First failure marker found in `stderr`, if any.
    pub fn find_failure(&self, stderr: &str) -> Option<&'static str> {
        let lower = stderr.to_lowercase();
        self.failure_markers
            .iter()
            .copied()
            .find(|marker| lower.contains(marker))
    }

    /// Last input/output token counts mentioned in `text`.
    pub fn extract_token_usage(&self, text: &str) -> Option<TokenUsage> {
        let input = last_count(&self.input_tokens, text);
        let output = last_count(&self.output_tokens, text);
        if input.is_none() && output.is_none() {
            return None;
        }
        Some(TokenUsage {
            input_tokens: input.unwrap_or(0),
            output_tokens: output.unwrap_or(0),
        })
    }

    /// Paths mentioned with creation, modification, or deletion phrasing.
    pub fn extract_file_changes(&self, text: &str) -> FileChanges {
        FileChanges {
            created: collect_paths(&self.created, text),
            modified: collect_paths(&self.modified, text),
            deleted: collect_paths(&self.deleted, text),
        }
    }
}

/// The count from whichever pattern matched furthest into `text`.
fn last_count(patterns: &[Regex], text: &str) -> Option<u64> {
    patterns
        .iter()
        .filter_map(|re| {
            re.captures_iter(text)
                .last()
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_count(m.as_str()).map(|n| (m.start(), n)))
        })
        .max_by_key(|(pos, _)| *pos)
        .map(|(_, n)| n)
}

fn collect_paths(patterns: &[Regex], text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), clean_path(m.as_str())))
        .filter(|(_, path)| !path.is_empty())
        .collect();
    found.sort_by_key(|(pos, _)| *pos);

    let mut paths: Vec<String> = Vec::new();
    for (_, path) in found {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

fn clean_path(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '`' | '\'' | '"'))
        .trim_end_matches(|c| matches!(c, '.' | ',' | ':' | ';' | ')'))
        .to_string()
}

/// Parse counts like `1234`, `12,345`, `12k`, or `1.5k`.
pub fn parse_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let lower = cleaned.to_ascii_lowercase();
    let (number, multiplier) = match lower.strip_suffix('k') {
        Some(n) => (n, 1_000.0),
        None => match lower.strip_suffix('m') {
            Some(n) => (n, 1_000_000.0),
            None => (lower.as_str(), 1.0),
        },
    };
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

/// Turns per-line phase detections into monotonic progress events.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: Option<Phase>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Phase> {
        self.current
    }

    /// Event for `line` if it moves progress forward.
    pub fn observe(&mut self, patterns: &OutputPatterns, line: &str) -> Option<ProgressEvent> {
        let phase = patterns.detect_phase(line)?;
        self.advance(phase, line)
    }

    /// Final event for a successful run.
    pub fn complete(&mut self) -> Option<ProgressEvent> {
        self.advance(Phase::Complete, "Execution finished")
    }

    fn advance(&mut self, phase: Phase, message: &str) -> Option<ProgressEvent> {
        if self.current.is_some_and(|current| current >= phase) {
            return None;
        }
        self.current = Some(phase);
        let summary: String = message.trim().chars().take(120).collect();
        Some(ProgressEvent::new(phase, summary))
    }
}
