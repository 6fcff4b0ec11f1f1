//! `indicatif`-backed progress and logger setup.
//!
//! Log lines go through `indicatif-log-bridge` so they are suspended while
//! the stage bar redraws.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use prelev_models::progress::ProgressCallback;

const LOADING_TEMPLATE: &str = "{prefix:.bold.dim} {spinner:.green} {msg}";
const PASS_TEMPLATE: &str =
    "{prefix:.bold.dim} {msg:<24} [{bar:32.green/blue}] {human_pos}/{human_len} ({eta})";

/// Run-wide bar. It spins while inputs load, and each pass that announces
/// its length becomes a numbered bar stage.
pub struct IndicatifProgress {
    bar: ProgressBar,
    pass_style: ProgressStyle,
    passes: AtomicUsize,
}

impl IndicatifProgress {
    fn new(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::with_template(LOADING_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("[io]");

        let pass_style = ProgressStyle::with_template(PASS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        Self {
            bar,
            pass_style,
            passes: AtomicUsize::new(0),
        }
    }

    /// Creates the stage bar shared by every pass of one run.
    #[must_use]
    pub fn stage_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(message.to_string());
        Arc::new(Self::new(bar))
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        self.bar.set_prefix(format!("[{pass}]"));
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.pass_style.clone());
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Installs `pretty_env_logger` behind the progress bridge.
///
/// Returns the [`MultiProgress`] every bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // A logger may already be installed when embedded in another binary.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
