use crate::commands::{run_export, run_latest, run_match, ExportArgs, LatestArgs, MatchArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use lab_match::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "lab-match-api",
    about = "Allocate school lab visits and serve the latest proposals",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Execute matching runs against the JSON store and print a summary
    Match(MatchArgs),
    /// Print the latest stored run for a destination
    Latest(LatestArgs),
    /// Write the proposal CSV for the latest run of a destination
    Export(ExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Match(args) => run_match(args),
        Command::Latest(args) => run_latest(args),
        Command::Export(args) => run_export(args),
    }
}
