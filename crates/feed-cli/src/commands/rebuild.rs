//! `feed-admin rebuild`

use std::sync::Arc;

use anyhow::Result;
use feed_core::{LocalFileSystem, Repository};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Cli;

pub async fn run(cli: &Cli, repo: &Arc<Repository<LocalFileSystem>>) -> Result<()> {
    let token = CancellationToken::new();
    repo.rebuild(&token).await?;
    info!("rebuilt metadata cache from disk");

    if cli.json {
        println!("{{\"rebuilt\":true}}");
    } else {
        println!("rebuilt metadata cache from disk");
    }
    Ok(())
}
