use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod settings;

use commands::auth::AuthCommand;
use commands::check::CheckArgs;
use commands::serve::ServeArgs;

#[derive(Parser, Debug)]
#[command(name = "quarry", version, about = "BigQuery tools for AI agents over MCP")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server (stdio by default).
    Serve(ServeArgs),

    /// Manage OAuth credentials.
    Auth(AuthCommand),

    /// Validate configuration and test BigQuery access.
    Check(CheckArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve(args) => commands::serve::execute(args).await,
        Command::Auth(cmd) => commands::auth::execute(cmd).await,
        Command::Check(args) => commands::check::execute(args).await,
    }
}
