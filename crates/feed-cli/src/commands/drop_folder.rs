//! `feed-admin drop` — ingest any archives sitting directly in the repository
//! root, the same path the background drop-folder scan takes.

use std::sync::Arc;

use anyhow::Result;
use feed_core::{LocalFileSystem, Repository};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Cli;

pub async fn run(cli: &Cli, repo: &Arc<Repository<LocalFileSystem>>) -> Result<()> {
    let token = CancellationToken::new();
    let ingested = repo.add_packages_from_drop_folder(&token).await?;
    info!(ingested, "ingested packages from drop folder");

    if cli.json {
        println!("{{\"ingested\":{ingested}}}");
    } else {
        println!("ingested {ingested} package(s) from drop folder");
    }
    Ok(())
}
