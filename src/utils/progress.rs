use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// Steps a single filing goes through, used as bar positions.
pub const STEPS: u64 = 3;

/// One bar per filing in a batch. Without a `MultiProgress` every call is a
/// no-op, which keeps library callers and tests quiet.
#[derive(Clone)]
pub struct ProgressTracker {
    progress_bar: Option<ProgressBar>,
    doc_name: String,
}

impl ProgressTracker {
    pub fn new(multi_progress: Option<&Arc<MultiProgress>>, doc_name: &str) -> Self {
        let progress_bar = multi_progress.map(|mp| {
            let pb = mp.add(ProgressBar::new(STEPS));
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg:>50}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        Self {
            progress_bar,
            doc_name: doc_name.to_string(),
        }
    }

    pub fn hidden(doc_name: &str) -> Self {
        Self::new(None, doc_name)
    }

    pub fn update_message(&self, message: &str) {
        if let Some(pb) = &self.progress_bar {
            pb.set_message(format!("{} [{}]", message, self.doc_name));
        }
    }

    pub fn step(&self, message: &str) {
        if let Some(pb) = &self.progress_bar {
            pb.inc(1);
        }
        self.update_message(message);
    }

    pub fn finish(&self, message: &str) {
        if let Some(pb) = &self.progress_bar {
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.green/blue}] {msg:>50}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_position(STEPS);
            pb.finish_with_message(format!("{} [{}]", message, self.doc_name));
        }
    }

    pub fn position(&self) -> u64 {
        self.progress_bar.as_ref().map(|pb| pb.position()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_tracker_is_inert() {
        let tracker = ProgressTracker::hidden("acme.htm");
        tracker.step("Fetching");
        tracker.finish("Done");
        assert_eq!(tracker.position(), 0);
    }

    #[test]
    fn test_tracker_counts_steps() {
        let mp = Arc::new(MultiProgress::with_draw_target(
            indicatif::ProgressDrawTarget::hidden(),
        ));
        let tracker = ProgressTracker::new(Some(&mp), "acme.htm");
        tracker.step("Fetching");
        tracker.step("Parsing");
        assert_eq!(tracker.position(), 2);
        tracker.finish("Saved");
        assert_eq!(tracker.position(), STEPS);
    }
}
