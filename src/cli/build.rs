//! Build command: one full pass over all pages, then watch mode.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::SiteConfig;
use crate::pool::{RenderRunner, WorkerPool};
use crate::watch::Orchestrator;

use super::args::{BuildArgs, Cli};

/// Run the build (and optionally watch) flow. Startup errors (unreadable
/// site root, tracker store failures) are fatal and propagate.
pub fn run(cli: &Cli, args: &BuildArgs, watch: bool) -> Result<()> {
    let config = Arc::new(SiteConfig::load(&cli.root)?);
    let workers = args.workers.unwrap_or_else(|| config.worker_count());
    crate::log!("build"; "site {} ({} workers)", config.root().display(), workers);

    let runner = Arc::new(RenderRunner::new(Arc::clone(&config)));
    let pool = WorkerPool::new(workers, runner);
    let orchestrator = Orchestrator::new(config, pool)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    rt.block_on(async {
        orchestrator.full_build().await?;
        if watch {
            orchestrator.reconcile().await?;
            orchestrator.run().await?;
        }
        Ok::<_, anyhow::Error>(())
    })?;

    orchestrator.close();
    Ok(())
}
