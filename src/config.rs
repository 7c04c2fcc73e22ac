//! Compiler and runtime configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Board assumed when none is given
pub const DEFAULT_BOARD: &str = "pynq-z2";

/// Environment variable overriding the default workspace directory
pub const WORKSPACE_ENV: &str = "PYLOG_WORKSPACE";

/// Unroll loops with at most this many iterations
pub const DEFAULT_UNROLL_LIMIT: u64 = 8;

/// Workspace directory from `PYLOG_WORKSPACE`, else `./pylog_workspace`
pub fn default_workspace() -> PathBuf {
    std::env::var_os(WORKSPACE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pylog_workspace"))
}

/// Settings passed through to the deployment collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub board: String,
    /// Kernel clock in MHz
    pub freq: f64,
    /// Report kernel execution time
    pub timing: bool,
}

impl RuntimeConfig {
    /// Runtime settings with the board's default clock: 200 MHz on AWS F1 and
    /// Alveo cards, 100 MHz elsewhere
    pub fn for_board(board: impl Into<String>) -> Self {
        let board = board.into();
        let freq = if board == "aws_f1" || board.starts_with("alveo") {
            200.0
        } else {
            100.0
        };
        Self {
            board,
            freq,
            timing: false,
        }
    }

    pub fn with_freq(mut self, freq: Option<f64>) -> Self {
        if let Some(freq) = freq {
            self.freq = freq;
        }
        self
    }

    pub fn with_timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::for_board(DEFAULT_BOARD)
    }
}

/// Options controlling one compilation
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Directory receiving `<top>.cpp` and `<top>.json`
    pub workspace: PathBuf,
    /// Write the generated files (otherwise only return them)
    pub write_output: bool,
    /// Dump the IR after each pass at `debug` level
    pub debug: bool,
    pub unroll_limit: u64,
    pub runtime: RuntimeConfig,
}

impl CompileOptions {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Self::default()
        }
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            write_output: true,
            debug: false,
            unroll_limit: DEFAULT_UNROLL_LIMIT,
            runtime: RuntimeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_clock_defaults() {
        assert_eq!(RuntimeConfig::for_board("aws_f1").freq, 200.0);
        assert_eq!(RuntimeConfig::for_board("alveo_u280").freq, 200.0);
        assert_eq!(RuntimeConfig::for_board("zcu104").freq, 100.0);
        assert_eq!(RuntimeConfig::default().board, DEFAULT_BOARD);
    }

    #[test]
    fn test_explicit_clock_wins() {
        let config = RuntimeConfig::for_board("aws_f1").with_freq(Some(250.0));
        assert_eq!(config.freq, 250.0);
        let config = RuntimeConfig::for_board("aws_f1").with_freq(None);
        assert_eq!(config.freq, 200.0);
    }
}
