// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smd`'s `clap::Parser` configuration, matching the teacher's `Config`
//! idiom (`examples/groblegark-coop/crates/cli/src/config.rs`): one flat
//! struct, every field an `--arg`/`env` pair, validated once after parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Coordinates concurrently running interactive coding-agent sessions:
/// registry, message delivery, output monitoring, and timers.
#[derive(Debug, Parser, Clone)]
#[command(name = "smd", version, about)]
pub struct SmdConfig {
    /// Address to bind the HTTP surface to. Loopback only — the API carries
    /// no authentication (`spec.md` §1 Non-goals).
    #[arg(long, env = "SMD_BIND_ADDR", default_value = "127.0.0.1:8420")]
    pub bind_addr: String,

    /// Directory holding the SQLite database, the JSON session snapshot,
    /// and other durable daemon state.
    #[arg(long, env = "SMD_STATE_DIR", default_value = "~/.sm/state")]
    pub state_dir: PathBuf,

    /// Directory holding per-session append-only capture logs.
    #[arg(long, env = "SMD_LOG_DIR", default_value = "~/.sm/logs")]
    pub log_dir: PathBuf,

    /// Path to the `tmux` binary the terminal driver shells out to.
    #[arg(long, env = "SMD_TMUX_BIN", default_value = "tmux")]
    pub tmux_bin: String,

    /// Output monitor poll interval, in milliseconds.
    #[arg(long, env = "SMD_MONITOR_POLL_MS", default_value = "1000")]
    pub monitor_poll_ms: u64,

    /// Seconds of no pane growth before a session is considered idle.
    #[arg(long, env = "SMD_IDLE_THRESHOLD_SECONDS", default_value = "300")]
    pub idle_threshold_seconds: u64,

    /// Bound on messages drained per delivery batch.
    #[arg(long, env = "SMD_MAX_BATCH_SIZE", default_value = "20")]
    pub max_batch_size: usize,

    /// Settle delay between text and Enter in the two-call send protocol,
    /// in milliseconds (`spec.md` §4.1).
    #[arg(long, env = "SMD_SETTLE_DELAY_MS", default_value = "300")]
    pub settle_delay_ms: u64,

    /// Default soft/hard remind thresholds an EM's auto-registered child
    /// gets (scenario 6, `spec.md` §8).
    #[arg(long, env = "SMD_REMIND_SOFT_SECONDS", default_value = "180")]
    pub remind_soft_seconds: u64,
    #[arg(long, env = "SMD_REMIND_HARD_SECONDS", default_value = "300")]
    pub remind_hard_seconds: u64,

    /// Context-usage one-shot alert thresholds, as percentages.
    #[arg(long, env = "SMD_CONTEXT_WARNING_PERCENTAGE", default_value = "50")]
    pub context_warning_percentage: f64,
    #[arg(long, env = "SMD_CONTEXT_CRITICAL_PERCENTAGE", default_value = "65")]
    pub context_critical_percentage: f64,

    /// Log format: `json` or `text`.
    #[arg(long, env = "SMD_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SMD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl SmdConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid --log-format: {} (expected json or text)", self.log_format);
        }
        if self.context_warning_percentage >= self.context_critical_percentage {
            anyhow::bail!("--context-warning-percentage must be less than --context-critical-percentage");
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolved_state_dir().join("sm.sqlite3")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.resolved_state_dir().join("sessions.json")
    }

    pub fn resolved_state_dir(&self) -> PathBuf {
        expand_tilde(&self.state_dir)
    }

    pub fn resolved_log_dir(&self) -> PathBuf {
        expand_tilde(&self.log_dir)
    }

    pub fn engine_config(&self) -> sm_engine::config::EngineConfig {
        sm_engine::config::EngineConfig {
            monitor_poll_interval: Duration::from_millis(self.monitor_poll_ms),
            idle_threshold_seconds: self.idle_threshold_seconds,
            max_batch_size: self.max_batch_size,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            default_remind_soft_seconds: self.remind_soft_seconds,
            default_remind_hard_seconds: self.remind_hard_seconds,
            context_warning_percentage: self.context_warning_percentage,
            context_critical_percentage: self.context_critical_percentage,
            ..sm_engine::config::EngineConfig::default()
        }
    }
}

fn expand_tilde(path: &std::path::Path) -> PathBuf {
    let Some(s) = path.to_str() else { return path.to_path_buf() };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SmdConfig {
        SmdConfig {
            bind_addr: "127.0.0.1:8420".into(),
            state_dir: "/tmp/sm/state".into(),
            log_dir: "/tmp/sm/logs".into(),
            tmux_bin: "tmux".into(),
            monitor_poll_ms: 1000,
            idle_threshold_seconds: 300,
            max_batch_size: 20,
            settle_delay_ms: 300,
            remind_soft_seconds: 180,
            remind_hard_seconds: 300,
            context_warning_percentage: 50.0,
            context_critical_percentage: 65.0,
            log_format: "text".into(),
            log_level: "info".into(),
        }
    }

    #[test]
    fn rejects_bad_log_format() {
        let mut c = base();
        c.log_format = "xml".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_inverted_context_thresholds() {
        let mut c = base();
        c.context_warning_percentage = 70.0;
        c.context_critical_percentage = 65.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn db_path_is_under_state_dir() {
        let c = base();
        assert_eq!(c.db_path(), PathBuf::from("/tmp/sm/state/sm.sqlite3"));
    }

    #[test]
    fn tilde_expands_against_home() {
        std::env::set_var("HOME", "/home/op");
        let mut c = base();
        c.state_dir = "~/.sm/state".into();
        assert_eq!(c.resolved_state_dir(), PathBuf::from("/home/op/.sm/state"));
    }
}
