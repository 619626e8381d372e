//! Handler for the `schema` command.

use colored::*;
use std::fs;
use std::path::{Path, PathBuf};

use sandfmt_lib::config::Config;
use sandfmt_lib::exit_codes;

use crate::SchemaAction;

const SCHEMA_FILE: &str = "sandfmt.schema.json";

/// JSON schema for the configuration file, pretty-printed.
pub fn schema_json() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(Config);
    serde_json::to_string_pretty(&schema)
}

/// Handle the schema subcommand (print, generate, or check).
pub fn handle_schema(action: SchemaAction, config_path: Option<&Path>) -> i32 {
    let schema_json = match schema_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("{}: Failed to serialize schema: {}", "Error".red().bold(), e);
            return exit_codes::TOOL_ERROR;
        }
    };

    match action {
        SchemaAction::Print => {
            println!("{schema_json}");
            exit_codes::SUCCESS
        }
        SchemaAction::Generate => {
            let schema_path = get_project_schema_path(config_path);
            let existing_schema = fs::read_to_string(&schema_path).ok();

            if existing_schema.as_ref() == Some(&schema_json) {
                println!("Schema is already up-to-date: {}", schema_path.display());
            } else if let Err(e) = fs::write(&schema_path, &schema_json) {
                eprintln!("{}: Failed to write schema file: {}", "Error".red().bold(), e);
                return exit_codes::TOOL_ERROR;
            } else {
                println!("Schema updated: {}", schema_path.display());
            }
            exit_codes::SUCCESS
        }
        SchemaAction::Check => {
            let schema_path = get_project_schema_path(config_path);
            let Ok(existing_schema) = fs::read_to_string(&schema_path) else {
                eprintln!("Error: Schema file not found: {}", schema_path.display());
                eprintln!("Run 'sandfmt schema generate' to create it.");
                return exit_codes::TOOL_ERROR;
            };

            if existing_schema != schema_json {
                eprintln!("Error: Schema is out of date: {}", schema_path.display());
                eprintln!("Run 'sandfmt schema generate' to update it.");
                exit_codes::TOOL_ERROR
            } else {
                println!("Schema is up-to-date: {}", schema_path.display());
                exit_codes::SUCCESS
            }
        }
    }
}

/// The schema lives in the workspace root, next to the configuration file.
fn get_project_schema_path(config_path: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    super::workspace_root(config_path, &cwd).join(SCHEMA_FILE)
}
