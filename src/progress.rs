//! Progress feedback for long running analyses.
//!
//! Bars go to stderr and are hidden when stderr is not a terminal, when
//! `COUPLINGMAP_QUIET` is set, or in worker mode where the process is driven
//! by a master.
//!
//! ```rust,no_run
//! use couplingmap::progress::{ProgressConfig, ProgressManager, TEMPLATE_PAIRS};
//!
//! let manager = ProgressManager::new(ProgressConfig::from_env(false, 0));
//! let bar = manager.create_bar(100, TEMPLATE_PAIRS);
//! bar.set_message("Analyzing pairs");
//! for _ in 0..100 {
//!     bar.inc(1);
//! }
//! bar.finish_and_clear();
//! ```

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

pub const TEMPLATE_PAIRS: &str =
    "🔗 {msg} {pos}/{len} nodes ({percent}%) - {per_sec}/sec - {eta}";
pub const TEMPLATE_JOBS: &str = "⚙️  {msg} {pos}/{len} jobs ({percent}%) - {eta}";
pub const TEMPLATE_SPINNER: &str = "{spinner} {msg}";

pub const QUIET_ENV: &str = "COUPLINGMAP_QUIET";

#[derive(Debug, Clone, Default)]
pub struct ProgressConfig {
    pub quiet_mode: bool,
    pub verbosity: u8,
}

impl ProgressConfig {
    pub fn from_env(quiet: bool, verbosity: u8) -> Self {
        Self {
            quiet_mode: quiet || std::env::var(QUIET_ENV).is_ok(),
            verbosity,
        }
    }

    pub fn should_show_progress(&self) -> bool {
        if self.quiet_mode {
            return false;
        }
        use std::io::IsTerminal;
        std::io::stderr().is_terminal()
    }
}

static GLOBAL_PROGRESS: Lazy<Mutex<Option<ProgressManager>>> = Lazy::new(|| Mutex::new(None));

/// Coordinates the bars of one run
#[derive(Clone)]
pub struct ProgressManager {
    multi: Arc<MultiProgress>,
    config: ProgressConfig,
}

impl ProgressManager {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            multi: Arc::new(MultiProgress::new()),
            config,
        }
    }

    pub fn init_global(config: ProgressConfig) {
        *GLOBAL_PROGRESS.lock() = Some(Self::new(config));
    }

    pub fn global() -> Option<Self> {
        GLOBAL_PROGRESS.lock().clone()
    }

    /// Hidden unless progress should be shown
    pub fn create_bar(&self, len: u64, template: &str) -> ProgressBar {
        if !self.config.should_show_progress() {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        pb
    }

    pub fn create_spinner(&self, msg: &str) -> ProgressBar {
        if !self.config.should_show_progress() {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template(TEMPLATE_SPINNER)
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }

    pub fn verbosity(&self) -> u8 {
        self.config.verbosity
    }

    /// Call before printing results so bars don't interleave with them
    pub fn clear(&self) -> std::io::Result<()> {
        self.multi.clear()
    }
}

/// Bar from the global manager, hidden when none is installed
pub fn global_bar(len: u64, template: &str) -> ProgressBar {
    ProgressManager::global()
        .map(|m| m.create_bar(len, template))
        .unwrap_or_else(ProgressBar::hidden)
}
