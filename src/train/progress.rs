//! Terminal progress reporting shared across training workers.
//!
//! Workers bump an atomic counter; rendering is throttled so a hot
//! training loop is not serialised behind terminal writes.

use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

const BAR_WIDTH: usize = 30;
const RENDER_EVERY_MS: u64 = 100;

pub struct ProgressBar {
    total: AtomicUsize,
    current: AtomicUsize,
    label: String,
    start: Instant,
    last_render_ms: AtomicU64,
}

impl ProgressBar {
    pub fn new(total: usize, label: &str) -> Self {
        ProgressBar {
            total: AtomicUsize::new(total),
            current: AtomicUsize::new(0),
            label: label.to_string(),
            start: Instant::now(),
            last_render_ms: AtomicU64::new(0),
        }
    }

    /// Grows the total; used while the file list is still being
    /// discovered.
    pub fn add_total(&self, n: usize) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    /// Marks one unit done and re-renders if enough time has passed.
    pub fn inc(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);

        let elapsed = self.start.elapsed().as_millis() as u64;
        let last = self.last_render_ms.load(Ordering::Relaxed);
        if elapsed.saturating_sub(last) < RENDER_EVERY_MS {
            return;
        }
        // One worker wins the right to render this tick.
        if self
            .last_render_ms
            .compare_exchange(last, elapsed, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.render();
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn percentage(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 100.0;
        }
        self.current.load(Ordering::Relaxed) as f64 / total as f64 * 100.0
    }

    /// Renders the final state and moves to the next line.
    pub fn finish(&self) {
        let total = self.total.load(Ordering::Relaxed);
        self.current.store(total, Ordering::Relaxed);
        self.render();
        println!();
    }

    fn render(&self) {
        let total = self.total.load(Ordering::Relaxed);
        let current = self.current.load(Ordering::Relaxed);
        let pct = self.percentage();
        let filled = ((BAR_WIDTH as f64 * pct) / 100.0) as usize;
        let filled = filled.min(BAR_WIDTH);

        let bar: String = if filled < BAR_WIDTH {
            format!("{}>{}", "=".repeat(filled), " ".repeat(BAR_WIDTH - filled - 1))
        } else {
            "=".repeat(BAR_WIDTH)
        };

        let elapsed = self.start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { current as f64 / elapsed } else { 0.0 };
        print!(
            "\r{} [{bar}] {pct:.1}% ({current}/{total}) {rate:.1}/s\x1b[K",
            self.label
        );
        let _ = std::io::stdout().flush();
    }
}
