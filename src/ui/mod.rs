//! UI module for consistent CLI output
//!
//! Uses `cliclack` for styled output in a terminal, with automatic fallback
//! to plain output in CI/non-interactive environments. JSON output modes use a
//! quiet context so only the JSON document reaches stdout.
//!
//! # Example
//!
//! ```rust,ignore
//! use fnplane::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::for_format(args.format);
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Building pkg...");
//! // ... do work ...
//! spinner.stop("Build succeeded");
//!
//! ui::key_value(&ctx, "Artifact", "pkg-x1y2z3");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    build_logs, key_value, remark, section, step_error_detail, step_ok, step_ok_detail,
    step_warn_hint,
};
pub use progress::TaskSpinner;
