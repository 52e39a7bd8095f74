//! Configuration commands: `supportdesk config`.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use supportdesk::config::{DEFAULT_CONFIG_FILE, SupportConfig};

use super::super::ConfigCommands;

pub fn cmd_config(
    config: &SupportConfig,
    config_path: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Support Desk Configuration");
            println!("=========================");
            println!();
            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("No config file at {} (using defaults)", path.display());
            }
            println!();
            print!("{}", config.render_masked()?);

            let errors = config.validate();
            if !errors.is_empty() {
                println!();
                println!("Problems:");
                for e in &errors {
                    println!("  - {}", e);
                }
            }
        }
        Some(ConfigCommands::Init { force }) => {
            if path.exists() && !force {
                bail!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            SupportConfig::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
            println!("API keys are read from ANTHROPIC_API_KEY and OPENAI_API_KEY.");
        }
    }
    Ok(())
}
