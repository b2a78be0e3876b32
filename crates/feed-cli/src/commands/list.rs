//! `feed-admin list`

use std::sync::Arc;

use anyhow::Result;
use feed_core::{Compatibility, LocalFileSystem, Repository};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::output::print_packages;

pub async fn run(cli: &Cli, repo: &Arc<Repository<LocalFileSystem>>, id: Option<&str>) -> Result<()> {
    let token = CancellationToken::new();
    let packages = match id {
        Some(id) => repo.find_packages_by_id(id, Compatibility::Default, &token).await?,
        None => repo.get_packages(Compatibility::Default, &token).await?,
    };
    print_packages(&packages, cli.json);
    Ok(())
}
