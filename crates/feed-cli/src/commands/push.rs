//! `feed-admin push`

use std::sync::Arc;

use anyhow::Result;
use feed_core::{LocalFileSystem, PackageArchive, Repository};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Cli;

pub async fn run(cli: &Cli, repo: &Arc<Repository<LocalFileSystem>>, archive_path: &std::path::Path) -> Result<()> {
    let archive = PackageArchive::open(archive_path)?;
    let token = CancellationToken::new();
    let record = repo.add_package(archive, &token).await?;
    info!(id = %record.id, version = %record.version, "pushed package");

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("pushed {} {}", record.id, record.version);
    }
    Ok(())
}
