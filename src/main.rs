use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(author, version, about = "Run source formatters in isolated sandboxes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (default: discovered from the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logging, including every process run
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Format files with the enabled formatters
    Fmt(FmtArgs),
    /// List available formatters
    List,
    /// Configuration JSON schema
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct FmtArgs {
    /// Files or directories to format (default: the whole workspace)
    pub paths: Vec<PathBuf>,

    /// Report files that would change without writing them
    #[arg(long)]
    pub check: bool,

    /// Run only these formatters, in this order (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Keep sandbox directories for inspection
    #[arg(long)]
    pub keep_sandboxes: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum SchemaAction {
    /// Print the schema to stdout
    Print,
    /// Write the schema to sandfmt.schema.json
    Generate,
    /// Fail if sandfmt.schema.json is out of date
    Check,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else if quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let code = match cli.command {
        Commands::Fmt(args) => commands::fmt::handle_fmt(args, cli.config.as_deref(), cli.quiet).await,
        Commands::List => commands::list::handle_list(cli.config.as_deref()),
        Commands::Schema { action } => commands::schema::handle_schema(action, cli.config.as_deref()),
    };

    std::process::exit(code);
}
