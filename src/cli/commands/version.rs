//! Version command - print build information

use crate::cli::args::{OutputFormat, VersionArgs};
use crate::error::FnplaneResult;
use crate::info::BuildInfo;
use crate::ui::{self, UiContext};

/// Execute the version command
pub async fn execute(args: VersionArgs) -> FnplaneResult<()> {
    let info = BuildInfo::current();

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Table => {
            let ctx = UiContext::detect();
            ui::section(&ctx, &info.name);
            ui::key_value(&ctx, "Version", &info.version);
            ui::key_value(&ctx, "Git commit", info.git_commit.as_deref().unwrap_or("unknown"));
            ui::key_value(&ctx, "Build date", info.build_date.as_deref().unwrap_or("unknown"));
        }
    }

    Ok(())
}
