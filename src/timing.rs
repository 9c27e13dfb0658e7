//! Pipeline phase banners and durations.

use std::time::Instant;

/// One pipeline phase: prints its banner on start and its duration on finish.
pub struct Phase {
    title: String,
    start: Instant,
}

impl Phase {
    pub fn begin(title: impl Into<String>) -> Self {
        let title = title.into();
        println!("\n=== {} ===\n", title);
        Self {
            title,
            start: Instant::now(),
        }
    }

    /// Print how long the phase took. Phases that fail are never finished,
    /// so a missing duration line marks where a run stopped.
    pub fn finish(self) {
        let elapsed = self.start.elapsed();
        tracing::debug!("phase '{}' took {:?}", self.title, elapsed);
        let secs = elapsed.as_secs_f64();
        if secs >= 60.0 {
            println!("  [{:.1}m] {}", secs / 60.0, self.title);
        } else {
            println!("  [{:.1}s] {}", secs, self.title);
        }
    }
}
