use crate::engine::Engine;
use crate::segments::Segment;
use std::time::{Duration, Instant};

impl Engine {
    /// Render the prompt and describe the run: shell, the prompt itself, each
    /// segment's state and execution time, and where cache and config live.
    pub async fn print_debug(&mut self, started: Instant) -> String {
        let prompt = self.primary().await;
        self.debug_report(&prompt, started.elapsed())
    }

    pub fn debug_report(&self, prompt: &str, elapsed: Duration) -> String {
        let mut report = String::new();

        report.push_str(&format!("\nShell: {}\n", self.env().shell));
        report.push_str(&format!("\nPrompt:\n\n{}\n", prompt));
        report.push_str("\nSegments:\n\n");

        let labels: Vec<(String, &Segment)> = self
            .segments()
            .map(|segment| (format!("{}({})", segment.name(), state(segment)), segment))
            .collect();
        let width = labels.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

        for (label, segment) in &labels {
            report.push_str(&format!(
                "{:<width$} - {:>4} ms\n",
                label,
                segment.duration.as_millis(),
                width = width
            ));
        }

        report.push_str(&format!("\nRun duration: {}\n", humantime::format_duration(round(elapsed))));

        let cache_path = self
            .cache()
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "none".to_string());
        report.push_str(&format!("\nCache path: {}\n", cache_path));

        let config_path = self
            .env()
            .flags
            .config_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "built-in default".to_string());
        report.push_str(&format!("\nConfig path: {}\n", config_path));

        report
    }
}

fn state(segment: &Segment) -> &'static str {
    if segment.pending {
        "pending"
    } else if segment.enabled {
        "true"
    } else {
        "false"
    }
}

fn round(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}
