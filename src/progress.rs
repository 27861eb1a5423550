use std::time::Instant;

/// Stage reporter for the command line. Messages go through `log` with an elapsed-time stamp.
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        log::info!("[{ts}] {}", msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        log::warn!("[{ts}] {}", msg.as_ref());
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
