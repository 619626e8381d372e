//! Handler for the `list` command.

use colored::*;
use std::path::Path;

use sandfmt_lib::exit_codes;
use sandfmt_lib::formatter::FormatterRegistry;

/// Print every registered formatter with its command and file patterns.
pub fn handle_list(config_path: Option<&Path>) -> i32 {
    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| super::load_config(config_path, &cwd))
        .and_then(|(config, _)| Ok((FormatterRegistry::from_config(&config)?, config)));

    let (registry, config) = match result {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}: {e:#}", "Error".red().bold());
            return exit_codes::TOOL_ERROR;
        }
    };

    for name in registry.names() {
        let Some(formatter) = registry.get(name) else {
            continue;
        };
        let settings = config.settings(name);
        let position = config.fmt.enabled.iter().position(|enabled| enabled == name);
        let marker = match position {
            Some(_) if settings.skip => "skipped".dimmed(),
            Some(i) => format!("#{}", i + 1).as_str().green(),
            None => "off".dimmed(),
        };
        println!(
            "{:<14} {:<8} {} [{}]",
            name.bold(),
            marker,
            formatter.tool(&settings).binary,
            formatter.sources().patterns().join(", ")
        );
    }

    exit_codes::SUCCESS
}
