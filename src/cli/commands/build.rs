//! Build command - submit a source package to a running builder

use crate::builder::{BuildClient, BuildFailure, BuildRequest, BuildResponse, HttpBuildClient};
use crate::cli::args::{BuildArgs, OutputFormat};
use crate::error::FnplaneResult;
use crate::ui::{self, TaskSpinner, UiContext};
use std::time::Duration;

/// Execute the build command
pub async fn execute(args: BuildArgs) -> FnplaneResult<()> {
    let ctx = UiContext::for_format(args.format);
    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    let client = HttpBuildClient::with_timeout(&args.url, timeout);

    let request = BuildRequest {
        src_pkg_filename: args.src_pkg.clone(),
        command: args.command.unwrap_or_default(),
    };

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Building {} on {}", request.src_pkg_filename, client.url()));

    let (response, error) = match client.build(&request).await {
        Ok(response) => {
            spinner.stop("Build succeeded");
            (response, None)
        }
        Err(BuildFailure {
            error,
            artifact_filename,
            build_logs,
        }) => {
            spinner.stop_error("Build failed");
            let response = BuildResponse {
                artifact_filename,
                build_logs,
            };
            (response, Some(error))
        }
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Table => {
            ui::build_logs(&ctx, &response.build_logs);
            if !response.artifact_filename.is_empty() {
                ui::key_value(&ctx, "Artifact", &response.artifact_filename);
            }
        }
    }

    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
