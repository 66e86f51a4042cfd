//! Watch orchestrator.
//!
//! Ties the engine together: on startup reconciles on-disk state through
//! the source tracker, then listens for live filesystem events, debounces
//! and reduces them, classifies each path, consults the dependency graph
//! for cascading effects, and dispatches jobs to the worker pool.
//!
//! ```text
//! Watcher → Debouncer (pure timing) → reduce → classify/plan → WorkerPool
//!        → RenderResult → dependency-graph commit → links cascade
//! ```
//!
//! The orchestrator is the only writer of the dependency graph and the
//! sqlite trackers; workers only ever see `{id, kind, path}` requests.

pub mod classifier;
pub mod debouncer;
pub mod events;
pub mod router;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::SiteConfig;
use crate::deps::PageDeps;
use crate::pool::{JobCallback, JobKind, JobOutput, JobReply, JobSpec, WorkerPool};
use crate::render::RenderResult;
use crate::tracker::{SourceFileTracker, mtime_millis, outputs::OutputTracker};
use crate::utils::normalize_path;

use classifier::{PathCategory, classify};
use debouncer::Debouncer;
use events::{EventKind, FsEvent, reduce_events};
use router::Action;

struct Inner {
    config: Arc<SiteConfig>,
    pool: WorkerPool,
    deps: RwLock<PageDeps>,
    sources: Mutex<SourceFileTracker>,
    outputs: Mutex<OutputTracker>,
}

/// Engine state shared by the build pass and the watch loop.
///
/// One instance per watched site: the dependency graph and trackers are
/// owned here rather than living in module globals, which keeps tests and
/// multi-site use isolated. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: Arc<SiteConfig>, pool: WorkerPool) -> Result<Self> {
        let state_dir = config.state_dir();
        Ok(Self {
            inner: Arc::new(Inner {
                sources: Mutex::new(SourceFileTracker::open(&state_dir)?),
                outputs: Mutex::new(OutputTracker::open(&state_dir)?),
                deps: RwLock::new(PageDeps::new()),
                config,
                pool,
            }),
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.inner.config
    }

    /// The dependency graph (read access for routing decisions and tests).
    pub fn deps(&self) -> &RwLock<PageDeps> {
        &self.inner.deps
    }

    /// Render every page under `src/` through the pool and commit the
    /// resulting dependency sets.
    pub async fn full_build(&self) -> Result<()> {
        let src = self.inner.config.src_dir();
        if !src.exists() {
            crate::log!("build"; "no source tree at {}", src.display());
            return Ok(());
        }

        let mut pages = Vec::new();
        for entry in jwalk::WalkDir::new(&src) {
            let entry = entry.with_context(|| format!("enumerating {}", src.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if classify(&path) == Some(PathCategory::Page) {
                pages.push(path);
            }
        }
        pages.sort();

        crate::log!("build"; "rendering {} page(s)", pages.len());
        let handles: Vec<_> = pages
            .into_iter()
            .map(|page| self.spawn_render(page))
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Startup reconciliation: replay offline changes through the same
    /// handlers the watch loop uses, committing each path's tracker state
    /// only after its handler has been invoked.
    pub async fn reconcile(&self) -> Result<()> {
        let mut handles = Vec::new();

        for root in [
            self.inner.config.src_dir(),
            self.inner.config.templates_dir(),
        ] {
            let diff = self.inner.sources.lock().diff(&root)?;
            if diff.is_empty() {
                continue;
            }
            crate::log!(
                "watch";
                "reconcile {}: {} added, {} modified, {} removed",
                root.display(),
                diff.added.len(),
                diff.modified.len(),
                diff.removed.len()
            );

            let upserts = diff
                .added
                .into_iter()
                .map(|(path, mtime)| (path, mtime, EventKind::Create))
                .chain(
                    diff.modified
                        .into_iter()
                        .map(|(path, mtime)| (path, mtime, EventKind::Modify)),
                );
            for (path, mtime, kind) in upserts {
                handles.extend(self.route(&path, kind));
                self.inner.sources.lock().record(&path, mtime)?;
            }

            for path in diff.removed {
                handles.extend(self.route(&path, EventKind::Remove));
                self.inner.sources.lock().forget(&path)?;
            }
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Steady-state watch loop; returns when shutdown is requested.
    pub async fn run(&self) -> Result<()> {
        let src = self.inner.config.src_dir();
        let templates = self.inner.config.templates_dir();
        for dir in [&src, &templates] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
        }

        // notify's callback is sync; bridge it into the async world.
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;
        watcher.watch(&src, RecursiveMode::Recursive)?;
        crate::log!("watch"; "watching {}", src.display());
        watcher.watch(&templates, RecursiveMode::Recursive)?;
        crate::log!("watch"; "watching {}", templates.display());

        let (async_tx, mut async_rx) = tokio::sync::mpsc::channel::<notify::Event>(64);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        let mut debouncer = Debouncer::new();
        loop {
            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => {
                    if let Some(event) = events::from_notify(&event) {
                        debouncer.push(event);
                    }
                }
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if crate::core::is_shutdown() {
                        break;
                    }
                    if let Some(batch) = debouncer.take_if_ready() {
                        self.handle_batch(batch);
                    }
                }
            }
        }

        drop(watcher);
        Ok(())
    }

    /// Reduce a debounced batch and dispatch the resulting job plan.
    pub fn handle_batch(&self, batch: Vec<FsEvent>) -> Vec<JoinHandle<()>> {
        let mut reduced: Vec<_> = reduce_events(&batch).into_iter().collect();
        reduced.sort_by(|a, b| a.0.cmp(&b.0));

        let mut handles = Vec::new();
        for (path, kind) in reduced {
            let path = normalize_path(&path);
            crate::debug!("watch"; "{}: {}", kind.label(), path.display());

            // Keep the startup tracker in sync with live observations.
            match kind {
                EventKind::Create | EventKind::Modify => {
                    if let Ok(metadata) = std::fs::metadata(&path) {
                        let _ = self
                            .inner
                            .sources
                            .lock()
                            .record(&path, mtime_millis(&metadata));
                    }
                }
                EventKind::Remove => {
                    let _ = self.inner.sources.lock().forget(&path);
                }
            }

            handles.extend(self.route(&path, kind));
        }
        handles
    }

    /// Plan and execute the actions for one effective event.
    fn route(&self, path: &Path, kind: EventKind) -> Vec<JoinHandle<()>> {
        let actions = {
            let deps = self.inner.deps.read();
            router::plan(path, kind, &deps)
        };
        self.execute_actions(actions)
    }

    /// Dispatch actions to the pool; each returned handle completes after
    /// the job's result has been committed (graph, trackers, cascade).
    pub fn execute_actions(&self, actions: Vec<Action>) -> Vec<JoinHandle<()>> {
        actions
            .into_iter()
            .map(|action| match action {
                Action::Render(path) => self.spawn_render(path),
                Action::Copy(path) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        let spec = JobSpec::new(JobKind::CopyAsset, path.clone());
                        let ticket = this.inner.pool.push_with(spec, vec![log_outcome()]);
                        if let Ok(JobOutput::Copied(outputs)) = ticket.wait().await {
                            this.replace_outputs(&path, &outputs);
                        }
                    })
                }
                Action::RemovePage(path) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        let spec = JobSpec::new(JobKind::RemovePage, path.clone());
                        let ticket = this.inner.pool.push_with(spec, vec![log_outcome()]);
                        if ticket.wait().await.is_ok() {
                            this.inner.deps.write().forget(&path);
                            this.cleanup_outputs(&path);
                        }
                    })
                }
                Action::RemoveAsset(path) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        let spec = JobSpec::new(JobKind::RemoveAsset, path.clone());
                        let ticket = this.inner.pool.push_with(spec, vec![log_outcome()]);
                        if ticket.wait().await.is_ok() {
                            this.cleanup_outputs(&path);
                        }
                    })
                }
            })
            .collect()
    }

    /// Render one page as a task; completes after commit and cascade.
    pub fn spawn_render(&self, path: PathBuf) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.render_and_commit(path).await })
    }

    /// Render a page, then commit its dependency set. Boxed because the
    /// links cascade re-enters this for other pages.
    fn render_and_commit(&self, path: PathBuf) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let this = self.clone();
        Box::pin(async move {
            let spec = JobSpec::new(JobKind::Render, path.clone());
            let ticket = this.inner.pool.push_with(spec, vec![log_outcome()]);
            match ticket.wait().await {
                Ok(JobOutput::Rendered(result)) => this.commit_render(result).await,
                Ok(_) => {}
                Err(error) => {
                    // Logged by the outcome callback; a failed render is
                    // isolated and never retried automatically.
                    crate::debug!("watch"; "render rejected for {}: {}", path.display(), error);
                }
            }
        })
    }

    /// Commit one successful render into the graph and trackers, fanning
    /// out the links cascade when navigation metadata changed.
    async fn commit_render(&self, result: RenderResult) {
        self.inner.deps.write().record(
            &result.page_path,
            &result.templates_used,
            &result.svgs_used,
            &result.scripts_used,
            &result.css_used,
            &result.modules_used,
            result.links_used,
        );
        self.replace_outputs(&result.page_path, &result.outputs);

        if result.links_changed {
            // Cascade bound: only the converging links_changed flag drives
            // this, and the triggering page is excluded from the fan-out.
            let pages: Vec<PathBuf> = self
                .inner
                .deps
                .read()
                .pages_with_links()
                .into_iter()
                .filter(|page| page != &result.page_path)
                .collect();
            if !pages.is_empty() {
                crate::log!("watch"; "links changed, refreshing {} page(s)", pages.len());
                let handles: Vec<_> = pages
                    .into_iter()
                    .map(|page| self.spawn_render(page))
                    .collect();
                for handle in handles {
                    let _ = handle.await;
                }
            }
        }
    }

    /// Record a job's outputs, deleting ones it no longer produces.
    fn replace_outputs(&self, source: &Path, outputs: &[PathBuf]) {
        let stale = match self.inner.outputs.lock().replace(source, outputs) {
            Ok(stale) => stale,
            Err(error) => {
                crate::log!("error"; "output tracker: {}", error);
                return;
            }
        };
        remove_files(&stale);
    }

    /// Delete and untrack everything attributed to a removed source.
    fn cleanup_outputs(&self, source: &Path) {
        match self.inner.outputs.lock().remove_source(source) {
            Ok(outputs) => remove_files(&outputs),
            Err(error) => crate::log!("error"; "output tracker: {}", error),
        }
    }

    /// Shut the pool down (terminates workers, drops queues).
    pub fn close(&self) {
        self.inner.pool.close();
    }
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => crate::debug!("watch"; "removed stale output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => crate::log!("error"; "removing {}: {}", path.display(), e),
        }
    }
}

/// Per-job status line: success or failure with the affected path.
fn log_outcome() -> JobCallback {
    Box::new(|reply: &JobReply| match reply.outcome {
        Ok(_) => crate::logger::status_success(&format!(
            "{} -- {}",
            reply.spec.kind.action(),
            reply.spec.path.display()
        )),
        Err(error) => crate::logger::status_error(
            &format!(
                "{} failed -- {}",
                reply.spec.kind.label(),
                reply.spec.path.display()
            ),
            &error.message,
        ),
    })
}
