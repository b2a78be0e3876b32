//! `feed-admin delete`

use std::sync::Arc;

use anyhow::Result;
use feed_core::{LocalFileSystem, PackageVersion, Repository};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Cli;

pub async fn run(
    cli: &Cli,
    repo: &Arc<Repository<LocalFileSystem>>,
    id: &str,
    version: &str,
) -> Result<()> {
    let version_normalized = PackageVersion::parse(version)?.normalized();
    let token = CancellationToken::new();
    repo.remove_package(id, &version_normalized, &token).await?;
    info!(id, version = %version_normalized, "removed package");

    if cli.json {
        println!("{{\"id\":\"{id}\",\"version\":\"{version_normalized}\",\"removed\":true}}");
    } else {
        println!("removed {id} {version_normalized}");
    }
    Ok(())
}
