//! Progress reporting for ingestion runs
//!
//! Shows a byte counter while the source downloads and a running row count
//! while chunks are written, using the `indicatif` crate. A disabled reporter
//! draws nothing.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Progress reporter for a single ingestion
pub struct IngestProgress {
    multi: MultiProgress,
    download_bar: ProgressBar,
    rows_bar: ProgressBar,
    enabled: bool,
}

impl IngestProgress {
    /// Create a reporter; when `enabled` is false nothing is drawn
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        Self {
            multi,
            download_bar: ProgressBar::hidden(),
            rows_bar: ProgressBar::hidden(),
            enabled,
        }
    }

    /// A reporter that draws nothing
    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// Whether bars are drawn
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start the download bar; `total` is the Content-Length when known
    pub fn start_download(&mut self, total: Option<u64>) {
        if !self.enabled {
            return;
        }

        let bar = match total {
            Some(len) => {
                let bar = self.multi.add(ProgressBar::new(len));
                bar.set_style(
                    style(
                        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {bytes:>10}/{total_bytes:10} ({eta})",
                    )
                    .progress_chars("█▓▒░  "),
                );
                bar
            }
            None => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(style("{spinner:.magenta} [{elapsed_precise}] {msg}"));
                bar
            }
        };
        bar.enable_steady_tick(TICK);
        self.download_bar = bar;
    }

    /// Update bytes downloaded so far
    pub fn update_download(&self, bytes: u64) {
        if self.download_bar.length().is_some() {
            self.download_bar.set_position(bytes);
        } else {
            self.download_bar
                .set_message(format!("Downloaded {}", format_bytes(bytes)));
        }
    }

    /// Finish the download bar
    pub fn finish_download(&self, bytes: u64) {
        self.download_bar
            .finish_with_message(format!("✓ Downloaded {}", format_bytes(bytes)));
    }

    /// Start the row counter
    pub fn start_rows(&mut self) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(style("{spinner:.yellow} [{elapsed_precise}] {msg}"));
        bar.set_message("Rows: 0");
        bar.enable_steady_tick(TICK);
        self.rows_bar = bar;
    }

    /// Update chunk and row counts
    pub fn update_rows(&self, chunks: usize, rows: u64) {
        self.rows_bar.set_message(format!(
            "Rows: {} ({} chunks)",
            format_number(rows),
            format_number(chunks as u64)
        ));
    }

    /// Finish with success message
    pub fn finish_success(&self, msg: &str) {
        self.rows_bar.finish_with_message(format!("✓ {}", msg));
        self.download_bar.finish_and_clear();
    }

    /// Finish with error message
    pub fn finish_error(&self, msg: &str) {
        self.rows_bar.abandon_with_message(format!("✗ {}", msg));
        self.download_bar.abandon();
    }
}

/// Simple spinner for indeterminate operations
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    /// Create a new spinner with a message; hidden when `enabled` is false
    pub fn new(msg: &str, enabled: bool) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.set_style(style("{spinner:.green} {msg}"));
            bar.enable_steady_tick(TICK);
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(msg.to_string());

        Self { bar }
    }

    /// Finish with success
    pub fn finish_success(&self, msg: &str) {
        self.bar.finish_with_message(format!("✓ {}", msg));
    }

    /// Finish with error
    pub fn finish_error(&self, msg: &str) {
        self.bar.abandon_with_message(format!("✗ {}", msg));
    }
}

/// Format a number with thousand separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
