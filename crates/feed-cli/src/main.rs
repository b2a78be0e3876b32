//! `feed-admin`: an administration CLI for a self-hosted package feed
//! server's repository directory, grounded on the teacher's `blz-cli`
//! `main.rs` shape (parse args, initialize logging, build the core engine,
//! dispatch to a per-subcommand module).

mod cli;
mod commands;
mod logging;
mod output;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use feed_core::{LocalFileSystem, Repository, RepositoryOptions};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize_logging(&cli)?;

    let fs = LocalFileSystem::new(&cli.root)?;
    let options = RepositoryOptions::builder(&cli.root);
    let repo = Arc::new(Repository::new(fs, options)?);
    repo.spawn_background_tasks();

    match &cli.command {
        Commands::Push { archive } => commands::push::run(&cli, &repo, archive).await,
        Commands::List { id } => commands::list::run(&cli, &repo, id.as_deref()).await,
        Commands::Search { term, allow_prerelease } => {
            commands::search::run(&cli, &repo, term, *allow_prerelease).await
        }
        Commands::Delete { id, version } => commands::delete::run(&cli, &repo, id, version).await,
        Commands::Rebuild => commands::rebuild::run(&cli, &repo).await,
        Commands::Drop => commands::drop_folder::run(&cli, &repo).await,
    }
}
