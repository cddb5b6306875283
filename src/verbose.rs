use std::fmt;
use std::time::Instant;

/// Emit a verbose diagnostic message to stderr.
pub fn emit(verbose: bool, msg: &str) {
    if verbose {
        eprintln!("[sqlgate] {}", msg);
    }
}

/// Announce that a request entered a pipeline stage.
pub fn stage(verbose: bool, stage: impl fmt::Display) {
    emit(verbose, &format!("stage: {}", stage));
}

/// Emit `what (notes…, Nms)` using the timer's elapsed time.
pub fn timed(verbose: bool, what: &str, timer: &Timer, notes: &[&str]) {
    if verbose {
        emit(verbose, &timed_line(what, timer.elapsed_ms(), notes));
    }
}

fn timed_line(what: &str, elapsed_ms: u128, notes: &[&str]) -> String {
    let elapsed = format!("{}ms", elapsed_ms);
    let details: Vec<&str> = notes
        .iter()
        .copied()
        .filter(|note| !note.is_empty())
        .chain(std::iter::once(elapsed.as_str()))
        .collect();
    format!("{} ({})", what, details.join(", "))
}

/// A timer for measuring durations in verbose mode.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}
