// Loading feedback while a request is in flight. Purely time-based; the model
// gives no real progress signal.

use std::time::Duration;

pub const LOADING_STEPS: [&str; 7] = [
    "Reading PDF documents...",
    "Extracting equations and tables...",
    "Parsing visual figures...",
    "Cross-referencing methods...",
    "Resolving contradictions...",
    "Generating executable code...",
    "Finalizing experiment graph...",
];

const STEP_PERIOD: Duration = Duration::from_millis(1500);
const PROGRESS_CAP: f32 = 95.0;

pub fn loading_step(elapsed: Duration) -> &'static str {
    let idx = (elapsed.as_millis() / STEP_PERIOD.as_millis()) as usize % LOADING_STEPS.len();
    LOADING_STEPS[idx]
}

/// Percent estimate: 0.5% per 50ms, held at 95% until the answer arrives.
pub fn loading_progress(elapsed: Duration) -> f32 {
    (elapsed.as_millis() as f32 / 100.0).min(PROGRESS_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_rotate_and_wrap() {
        assert_eq!(loading_step(Duration::ZERO), LOADING_STEPS[0]);
        assert_eq!(loading_step(Duration::from_millis(1600)), LOADING_STEPS[1]);
        assert_eq!(loading_step(Duration::from_millis(1500 * 7)), LOADING_STEPS[0]);
    }

    #[test]
    fn progress_is_capped() {
        assert_eq!(loading_progress(Duration::from_millis(1000)), 10.0);
        assert_eq!(loading_progress(Duration::from_secs(60)), 95.0);
    }
}
