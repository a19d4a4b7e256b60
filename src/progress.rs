//! Rate-limited console progress reporting
//!
//! Volumes routinely run to tens of gigabytes, so both the crypto and the
//! transfer paths emit a short percentage line every so many bytes instead of
//! redrawing continuously. Setting `BAREOS_S3_NO_PROGRESS_BAR` suppresses the
//! trailing bar, which keeps nohup/cron logs readable.

/// Report interval for encrypt/decrypt progress (512 MiB)
pub const CRYPTO_REPORT_INTERVAL: u64 = 512 * 1024 * 1024;

/// Report interval for upload/download progress (200 MiB)
pub const TRANSFER_REPORT_INTERVAL: u64 = 200 * 1024 * 1024;

/// Target width of a progress line, bar included
const LINE_WIDTH: usize = 79;

/// Emits `[caption] Action  NN% [====    ]` lines at most once per interval
pub struct ProgressReporter {
    caption: String,
    action: &'static str,
    total_bytes: u64,
    interval: u64,
    processed: u64,
    next_report: u64,
    reported_anything: bool,
    hit_100: bool,
    draw_bar: bool,
}

impl ProgressReporter {
    /// Create a reporter for one file operation
    pub fn new(caption: &str, action: &'static str, total_bytes: u64, interval: u64) -> Self {
        Self {
            caption: caption.to_string(),
            action,
            // Avoid division by zero on empty volumes
            total_bytes: total_bytes.max(1),
            interval,
            processed: 0,
            next_report: interval,
            reported_anything: false,
            hit_100: false,
            draw_bar: std::env::var_os("BAREOS_S3_NO_PROGRESS_BAR").is_none(),
        }
    }

    /// Record `bytes` more bytes processed since the last call
    pub fn add_bytes(&mut self, bytes: u64) {
        self.set_bytes(self.processed + bytes);
    }

    /// Record the cumulative byte count (transfer callbacks report totals)
    pub fn set_bytes(&mut self, cumulative: u64) {
        self.processed = cumulative;
        if self.processed >= self.next_report {
            self.report();
        }
    }

    /// Force a final 100% line if progress was ever reported but never completed
    pub fn done(&mut self) {
        if self.reported_anything && !self.hit_100 {
            self.processed = self.total_bytes;
            self.next_report = 0;
            self.report();
        }
    }

    fn report(&mut self) {
        self.reported_anything = true;
        self.next_report = self.processed + self.interval;

        let percent = (100.0 * self.processed as f64) / self.total_bytes as f64;
        let rounded = percent.round() as u64;
        if rounded >= 100 {
            self.hit_100 = true;
        }

        let mut line = format!("[{}] {} {:>3}%", self.caption, self.action, rounded);
        if self.draw_bar {
            line.push_str(" [");
            let bar_width = LINE_WIDTH.saturating_sub(line.len() + 1);
            let cutoff = (bar_width as f64 * percent / 100.0) as usize;
            for i in 0..bar_width {
                line.push(if i <= cutoff { '=' } else { ' ' });
            }
            line.push(']');
        }

        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_report_below_interval() {
        let mut reporter = ProgressReporter::new("VOL", "Encrypt", 1000, 100);
        reporter.add_bytes(99);
        assert!(!reporter.reported_anything);
    }

    #[test]
    fn test_reports_at_interval() {
        let mut reporter = ProgressReporter::new("VOL", "Encrypt", 1000, 100);
        reporter.add_bytes(100);
        assert!(reporter.reported_anything);
        assert_eq!(reporter.next_report, 200);
    }

    #[test]
    fn test_done_forces_final_report() {
        let mut reporter = ProgressReporter::new("VOL", "Encrypt", 1000, 100);
        reporter.add_bytes(500);
        assert!(!reporter.hit_100);
        reporter.done();
        assert!(reporter.hit_100);
    }

    #[test]
    fn test_done_is_silent_when_nothing_reported() {
        let mut reporter = ProgressReporter::new("VOL", "Encrypt", 1000, 100);
        reporter.add_bytes(50);
        reporter.done();
        assert!(!reporter.reported_anything);
    }

    #[test]
    fn test_cumulative_updates() {
        let mut reporter = ProgressReporter::new("VOL", "Upload", 1000, 100);
        reporter.set_bytes(40);
        assert!(!reporter.reported_anything);
        reporter.set_bytes(250);
        assert!(reporter.reported_anything);
    }

    #[test]
    fn test_empty_total_does_not_divide_by_zero() {
        let mut reporter = ProgressReporter::new("VOL", "Encrypt", 0, 100);
        reporter.add_bytes(0);
        reporter.done();
    }
}
