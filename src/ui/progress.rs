//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use std::time::{Duration, Instant};

/// A task spinner with CI fallback
///
/// Stop messages carry the elapsed time since `start`.
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    started: Option<Instant>,
    interactive: bool,
    quiet: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            started: None,
            interactive: ctx.use_fancy_output(),
            quiet: ctx.is_quiet(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        self.started = Some(Instant::now());

        if self.quiet {
            return;
        }
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        let message = self.with_elapsed(message);
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if !self.quiet {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        let message = self.with_elapsed(message);
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if !self.quiet {
            eprintln!("{} {}", style("[FAIL]").red(), message);
        }
    }

    fn with_elapsed(&self, message: &str) -> String {
        match self.started {
            Some(started) => {
                let elapsed = format_elapsed(started.elapsed());
                format!("{} {}", message, style(elapsed).dim())
            }
            None => message.to_string(),
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 60 {
        format!("({}m {}s)", elapsed.as_secs() / 60, elapsed.as_secs() % 60)
    } else {
        format!("({:.1}s)", elapsed.as_secs_f64())
    }
}
