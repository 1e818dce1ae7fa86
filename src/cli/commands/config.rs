//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::schema::KEYS;
use crate::config::{Config, ConfigManager};
use crate::error::{FnplaneError, FnplaneResult};
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> FnplaneResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> FnplaneResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> FnplaneResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());

    Ok(())
}

async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> FnplaneResult<()> {
    let ctx = UiContext::detect();

    match manager.set_value(key, value).await {
        Ok(_) => {
            ui::step_ok(&ctx, &format!("Set {} = {}", key, value));
            Ok(())
        }
        Err(FnplaneError::User(reason)) if reason.starts_with("Unknown config key") => {
            ui::step_error_detail(&ctx, "Unknown config key", key);
            ui::remark(&ctx, "Valid keys:");
            for (key, _) in KEYS {
                eprintln!("  {}", key);
            }
            Err(FnplaneError::User(reason))
        }
        Err(e) => Err(e),
    }
}
