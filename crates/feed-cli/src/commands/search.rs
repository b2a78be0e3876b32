//! `feed-admin search`

use std::sync::Arc;

use anyhow::Result;
use feed_core::{Compatibility, LocalFileSystem, Repository};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::output::print_packages;

pub async fn run(
    cli: &Cli,
    repo: &Arc<Repository<LocalFileSystem>>,
    term: &str,
    allow_prerelease: bool,
) -> Result<()> {
    let token = CancellationToken::new();
    let packages = repo
        .search(term, &[], allow_prerelease, false, Compatibility::Default, &token)
        .await?;
    print_packages(&packages, cli.json);
    Ok(())
}
