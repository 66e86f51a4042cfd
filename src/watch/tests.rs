use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::classifier::{PathCategory, classify};
use super::debouncer::{DEBOUNCE_MS, Debouncer};
use super::events::{EventKind, FsEvent, from_notify, reduce_events};
use super::router::{Action, plan};
use super::Orchestrator;
use crate::config::SiteConfig;
use crate::deps::PageDeps;
use crate::pool::{RenderRunner, WorkerPool};

fn event(kind: EventKind, paths: &[&str]) -> FsEvent {
    FsEvent {
        kind,
        paths: paths.iter().map(PathBuf::from).collect(),
    }
}

// ----------------------------------------------------------------------------
// Event reducer
// ----------------------------------------------------------------------------

#[test]
fn reduce_records_first_sighting() {
    let reduced = reduce_events(&[event(EventKind::Modify, &["/s/a.html"])]);
    assert_eq!(reduced[&PathBuf::from("/s/a.html")], EventKind::Modify);
}

#[test]
fn reduce_create_then_modify_stays_create() {
    let reduced = reduce_events(&[
        event(EventKind::Create, &["/s/a.html"]),
        event(EventKind::Modify, &["/s/a.html"]),
    ]);
    assert_eq!(reduced[&PathBuf::from("/s/a.html")], EventKind::Create);
}

#[test]
fn reduce_modify_then_remove_takes_latest() {
    let reduced = reduce_events(&[
        event(EventKind::Modify, &["/s/a.html"]),
        event(EventKind::Remove, &["/s/a.html"]),
    ]);
    assert_eq!(reduced[&PathBuf::from("/s/a.html")], EventKind::Remove);
}

#[test]
fn reduce_remove_then_create_takes_latest() {
    let reduced = reduce_events(&[
        event(EventKind::Remove, &["/s/a.html"]),
        event(EventKind::Create, &["/s/a.html"]),
    ]);
    assert_eq!(reduced[&PathBuf::from("/s/a.html")], EventKind::Create);
}

#[test]
fn reduce_is_idempotent_on_stable_batch() {
    let batch = vec![
        event(EventKind::Create, &["/s/a.html", "/s/b.html"]),
        event(EventKind::Modify, &["/s/a.html"]),
        event(EventKind::Remove, &["/s/c.css"]),
    ];
    let once = reduce_events(&batch);
    let twice = reduce_events(&batch);
    assert_eq!(once, twice);
    assert_eq!(once.len(), 3);
}

#[test]
fn reduce_handles_multi_path_events_independently() {
    let reduced = reduce_events(&[
        event(EventKind::Create, &["/s/a.html", "/s/b.html"]),
        event(EventKind::Remove, &["/s/b.html"]),
    ]);
    assert_eq!(reduced[&PathBuf::from("/s/a.html")], EventKind::Create);
    assert_eq!(reduced[&PathBuf::from("/s/b.html")], EventKind::Remove);
}

// ----------------------------------------------------------------------------
// Notify adapter
// ----------------------------------------------------------------------------

fn notify_event(kind: notify::EventKind, paths: &[&str]) -> notify::Event {
    notify::Event {
        kind,
        paths: paths.iter().map(PathBuf::from).collect(),
        attrs: Default::default(),
    }
}

#[test]
fn metadata_only_modify_is_dropped() {
    let event = notify_event(
        notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
            notify::event::MetadataKind::Any,
        )),
        &["/s/a.html"],
    );
    assert!(from_notify(&event).is_none());
}

#[test]
fn temp_files_are_filtered_per_path() {
    let event = notify_event(
        notify::EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Any,
        )),
        &["/s/a.html", "/s/.a.html.swp", "/s/b.html~"],
    );
    let adapted = from_notify(&event).unwrap();
    assert_eq!(adapted.paths, vec![PathBuf::from("/s/a.html")]);
    assert_eq!(adapted.kind, EventKind::Modify);
}

// ----------------------------------------------------------------------------
// Classifier
// ----------------------------------------------------------------------------

#[test]
fn classify_pages_case_insensitive() {
    for path in ["/s/src/a.html", "/s/src/a.HTML", "/s/src/b.md", "/s/src/b.MD"] {
        assert_eq!(classify(Path::new(path)), Some(PathCategory::Page), "{path}");
    }
}

#[test]
fn classify_templates_by_segment_and_extension() {
    assert_eq!(
        classify(Path::new("/s/templates/head/default.tmpl")),
        Some(PathCategory::Template)
    );
    // Template extension outside a templates tree is not a template.
    assert_eq!(classify(Path::new("/s/other/default.tmpl")), None);
}

#[test]
fn classify_inline_svg_and_script() {
    assert_eq!(
        classify(Path::new("/s/src-svg/icon.svg")),
        Some(PathCategory::InlineSvg)
    );
    assert_eq!(
        classify(Path::new("/s/src/boot.inline.js")),
        Some(PathCategory::InlineScript)
    );
}

#[test]
fn classify_assets_by_whitelists() {
    assert_eq!(
        classify(Path::new("/s/media/logo.png")),
        Some(PathCategory::Asset)
    );
    assert_eq!(
        classify(Path::new("/s/src/styles.css")),
        Some(PathCategory::Asset)
    );
    assert_eq!(
        classify(Path::new("/s/src/app.js")),
        Some(PathCategory::Asset)
    );
    // Whitelist misses are ignored entirely.
    assert_eq!(classify(Path::new("/s/media/notes.txt")), None);
    assert_eq!(classify(Path::new("/s/src/data.bin")), None);
    assert_eq!(classify(Path::new("/elsewhere/styles.css")), None);
}

#[test]
fn classify_total_on_odd_inputs() {
    assert_eq!(classify(Path::new("")), None);
    assert_eq!(classify(Path::new("no-extension")), None);
}

// ----------------------------------------------------------------------------
// Debouncer
// ----------------------------------------------------------------------------

#[test]
fn debouncer_quiet_window() {
    let mut debouncer = Debouncer::new();
    assert!(!debouncer.is_ready());
    assert!(debouncer.take_if_ready().is_none());

    debouncer.push(event(EventKind::Modify, &["/s/a.html"]));
    assert!(!debouncer.is_ready(), "must wait out the quiet window");

    std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 20));
    assert!(debouncer.is_ready());
    let batch = debouncer.take_if_ready().unwrap();
    assert_eq!(batch.len(), 1);
    assert!(debouncer.take_if_ready().is_none());
}

#[test]
fn debouncer_sleep_duration_tracks_last_event() {
    let mut debouncer = Debouncer::new();
    assert!(debouncer.sleep_duration() >= Duration::from_millis(500));

    debouncer.push(event(EventKind::Modify, &["/s/a.html"]));
    assert!(debouncer.sleep_duration() <= Duration::from_millis(DEBOUNCE_MS));
}

// ----------------------------------------------------------------------------
// Router
// ----------------------------------------------------------------------------

fn graph_with_page(page: &str, template: &str, css: &str) -> PageDeps {
    let mut deps = PageDeps::new();
    deps.record(
        Path::new(page),
        &[PathBuf::from(template)],
        &[],
        &[],
        &[PathBuf::from(css)],
        &[],
        false,
    );
    deps
}

#[test]
fn page_upsert_plans_render() {
    let deps = PageDeps::new();
    let actions = plan(Path::new("/s/src/a.html"), EventKind::Modify, &deps);
    assert_eq!(actions, vec![Action::Render(PathBuf::from("/s/src/a.html"))]);
}

#[test]
fn template_change_renders_dependents_only() {
    let deps = graph_with_page("/s/src/a.html", "/s/templates/head/default.tmpl", "/s/src/x.css");
    let actions = plan(
        Path::new("/s/templates/head/default.tmpl"),
        EventKind::Modify,
        &deps,
    );
    assert_eq!(actions.len(), 1);
    assert!(matches!(&actions[0], Action::Render(p) if p.ends_with("a.html")));

    // Orphaned template: warn, no-op.
    let actions = plan(
        Path::new("/s/templates/head/unused.tmpl"),
        EventKind::Modify,
        &deps,
    );
    assert!(actions.is_empty());
}

#[test]
fn template_removal_renders_dependents_for_fallback() {
    let deps = graph_with_page("/s/src/a.html", "/s/templates/head/default.tmpl", "/s/src/x.css");
    let actions = plan(
        Path::new("/s/templates/head/default.tmpl"),
        EventKind::Remove,
        &deps,
    );
    assert_eq!(actions.len(), 1);
    assert!(matches!(&actions[0], Action::Render(_)));
}

#[test]
fn css_change_copies_and_renders_dependents() {
    let deps = graph_with_page("/s/src/a.html", "/s/templates/head/default.tmpl", "/s/src/x.css");
    let actions = plan(Path::new("/s/src/x.css"), EventKind::Modify, &deps);
    assert_eq!(actions[0], Action::Copy(PathBuf::from("/s/src/x.css")));
    assert!(actions[1..]
        .iter()
        .all(|a| matches!(a, Action::Render(p) if p.ends_with("a.html"))));
    assert_eq!(actions.len(), 2);
}

#[test]
fn unreferenced_asset_still_copies() {
    let deps = PageDeps::new();
    let actions = plan(Path::new("/s/src/x.css"), EventKind::Modify, &deps);
    assert_eq!(actions, vec![Action::Copy(PathBuf::from("/s/src/x.css"))]);
}

#[test]
fn module_change_renders_module_dependents() {
    let mut deps = PageDeps::new();
    deps.record(
        Path::new("/s/src/a.html"),
        &[],
        &[],
        &[],
        &[],
        &[PathBuf::from("/s/src/app.js")],
        false,
    );
    let actions = plan(Path::new("/s/src/app.js"), EventKind::Modify, &deps);
    assert_eq!(actions.len(), 2);
    assert!(matches!(&actions[1], Action::Render(_)));

    // Inline scripts are not modules: a change routes through the
    // inline-script index instead.
    let mut deps = PageDeps::new();
    deps.record(
        Path::new("/s/src/a.html"),
        &[],
        &[],
        &[PathBuf::from("/s/src/boot.inline.js")],
        &[],
        &[],
        false,
    );
    let actions = plan(Path::new("/s/src/boot.inline.js"), EventKind::Modify, &deps);
    assert_eq!(actions, vec![Action::Render(PathBuf::from("/s/src/a.html"))]);
}

#[test]
fn removals_plan_remove_jobs() {
    let deps = PageDeps::new();
    assert_eq!(
        plan(Path::new("/s/src/a.html"), EventKind::Remove, &deps),
        vec![Action::RemovePage(PathBuf::from("/s/src/a.html"))]
    );
    assert_eq!(
        plan(Path::new("/s/src/x.css"), EventKind::Remove, &deps),
        vec![Action::RemoveAsset(PathBuf::from("/s/src/x.css"))]
    );
    // remove + inline svg: no-op.
    assert!(plan(Path::new("/s/src-svg/i.svg"), EventKind::Remove, &deps).is_empty());
}

// ----------------------------------------------------------------------------
// End-to-end scenarios
// ----------------------------------------------------------------------------

fn make_site(hash_assets: bool, workers: usize) -> (TempDir, Orchestrator) {
    let temp = TempDir::new().unwrap();
    let mut config = SiteConfig::with_root(temp.path());
    config.build.hash_assets = hash_assets;
    std::fs::create_dir_all(config.src_dir()).unwrap();

    let config = Arc::new(config);
    let runner = Arc::new(RenderRunner::new(Arc::clone(&config)));
    let pool = WorkerPool::new(workers, runner);
    let orchestrator = Orchestrator::new(config, pool).unwrap();
    (temp, orchestrator)
}

fn write_page(
    config: &SiteConfig,
    rel: &str,
    head: &str,
    nav_label: Option<&str>,
    css: &[&str],
) -> PathBuf {
    let mut source = format!("title = \"{rel}\"\n");
    if !css.is_empty() {
        let list = css
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        source.push_str(&format!("css = [{list}]\n"));
    }
    source.push_str(&format!("[templates]\nhead = \"{head}\"\nnav = \"default\"\n"));
    if let Some(label) = nav_label {
        source.push_str(&format!("[links.nav]\nlabel = \"{label}\"\ntop_level = true\n"));
    }
    source.push_str("#---#\n<p>content</p>\n");

    let path = config.src_dir().join(rel);
    std::fs::write(&path, source).unwrap();
    path
}

fn write_template(config: &SiteConfig, slot: &str, name: &str, content: &str) -> PathBuf {
    let dir = config.templates_dir().join(slot);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{name}.tmpl"));
    std::fs::write(&path, content).unwrap();
    path
}

async fn drive(orchestrator: &Orchestrator, path: &Path, kind: EventKind) {
    let handles = orchestrator.handle_batch(vec![FsEvent {
        kind,
        paths: vec![path.to_path_buf()],
    }]);
    for handle in handles {
        let _ = handle.await;
    }
}

fn read_output(orchestrator: &Orchestrator, rel: &str) -> String {
    std::fs::read_to_string(orchestrator.config().output_dir().join(rel)).unwrap()
}

/// Scenario A: editing a template re-renders its dependents and only them.
#[tokio::test]
async fn template_edit_rerenders_dependents_only() {
    let (_temp, orchestrator) = make_site(false, 2);
    let config = orchestrator.config().clone();

    let template = write_template(&config, "head", "default", "<title>v1 {{ title }}</title>");
    write_template(&config, "head", "alt", "<title>alt {{ title }}</title>");
    let page_a = write_page(&config, "a.html", "default", None, &[]);
    write_page(&config, "b.html", "alt", None, &[]);

    orchestrator.full_build().await.unwrap();
    assert!(read_output(&orchestrator, "a.html").contains("v1 a.html"));

    // Overwrite the template; only a.html depends on head/default.
    std::fs::write(&template, "<title>v2 {{ title }}</title>").unwrap();
    {
        let deps = orchestrator.deps().read();
        let actions = plan(&template, EventKind::Modify, &deps);
        assert_eq!(actions, vec![Action::Render(page_a.clone())]);
    }
    drive(&orchestrator, &template, EventKind::Modify).await;

    assert!(read_output(&orchestrator, "a.html").contains("v2 a.html"));
    assert!(read_output(&orchestrator, "b.html").contains("alt b.html"));
}

/// Scenario B: a stylesheet edit with hashing enabled refreshes both the
/// fingerprinted file and the reference inside dependent pages, and drops
/// the previous fingerprint.
#[tokio::test]
async fn css_edit_refreshes_fingerprint_and_reference() {
    let (_temp, orchestrator) = make_site(true, 2);
    let config = orchestrator.config().clone();

    let css = config.src_dir().join("styles.css");
    std::fs::write(&css, "body { color: red }").unwrap();
    write_page(&config, "a.html", "default", None, &["styles.css"]);

    orchestrator.full_build().await.unwrap();

    let first_name =
        crate::render::assets::hashed_file_name("styles.css", b"body { color: red }");
    assert!(config.output_dir().join(&first_name).is_file());
    assert!(read_output(&orchestrator, "a.html").contains(&first_name));

    std::fs::write(&css, "body { color: blue }").unwrap();
    drive(&orchestrator, &css, EventKind::Modify).await;

    let second_name =
        crate::render::assets::hashed_file_name("styles.css", b"body { color: blue }");
    assert_ne!(first_name, second_name);
    assert!(config.output_dir().join(&second_name).is_file());
    assert!(
        !config.output_dir().join(&first_name).exists(),
        "previous fingerprint must be deleted"
    );
    assert!(read_output(&orchestrator, "a.html").contains(&second_name));
}

/// Scenario C: changing one page's nav label re-renders the other
/// link-bearing page without touching the link file by hand.
#[tokio::test]
async fn links_change_cascades_to_sibling_pages() {
    let (_temp, orchestrator) = make_site(false, 1);
    let config = orchestrator.config().clone();

    let page_a = write_page(&config, "a.html", "default", Some("Alpha"), &[]);
    write_page(&config, "b.html", "default", Some("Beta"), &[]);
    orchestrator.full_build().await.unwrap();

    assert!(read_output(&orchestrator, "b.html").contains("Alpha"));

    // Relabel page a; its render reports links_changed and the cascade
    // refreshes b's navigation.
    write_page(&config, "a.html", "default", Some("Omega"), &[]);
    drive(&orchestrator, &page_a, EventKind::Modify).await;

    let b_html = read_output(&orchestrator, "b.html");
    assert!(b_html.contains("Omega"));
    assert!(!b_html.contains("Alpha"));
}

/// Startup reconcile renders offline-added pages and cleans up
/// offline-removed ones.
#[tokio::test]
async fn reconcile_handles_offline_changes() {
    let (_temp, orchestrator) = make_site(false, 2);
    let config = orchestrator.config().clone();

    let page = write_page(&config, "a.html", "default", None, &[]);
    orchestrator.reconcile().await.unwrap();
    assert!(config.output_dir().join("a.html").is_file());

    // A second reconcile with no changes schedules nothing new and the
    // output remains.
    orchestrator.reconcile().await.unwrap();
    assert!(config.output_dir().join("a.html").is_file());

    // Offline deletion: reconcile removes the rendered output.
    std::fs::remove_file(&page).unwrap();
    orchestrator.reconcile().await.unwrap();
    assert!(!config.output_dir().join("a.html").exists());
}

/// A deleted page's render jobs stop resolving against the graph: the
/// remove path also forgets its dependency record.
#[tokio::test]
async fn page_removal_forgets_dependencies() {
    let (_temp, orchestrator) = make_site(false, 2);
    let config = orchestrator.config().clone();

    let template = write_template(&config, "head", "default", "<title>{{ title }}</title>");
    let page = write_page(&config, "a.html", "default", None, &[]);
    orchestrator.full_build().await.unwrap();
    assert_eq!(orchestrator.deps().read().pages_using_template(&template).len(), 1);

    std::fs::remove_file(&page).unwrap();
    drive(&orchestrator, &page, EventKind::Remove).await;

    assert!(orchestrator.deps().read().pages_using_template(&template).is_empty());
    assert!(!config.output_dir().join("a.html").exists());
}

/// Disabled-page marker routed through the render job removes the
/// original output and prunes its navigation entry.
#[tokio::test]
async fn disabled_page_event_removes_original() {
    let (_temp, orchestrator) = make_site(false, 1);
    let config = orchestrator.config().clone();

    write_page(&config, "a.html", "default", Some("Alpha"), &[]);
    write_page(&config, "b.html", "default", Some("Beta"), &[]);
    orchestrator.full_build().await.unwrap();
    assert!(read_output(&orchestrator, "b.html").contains("Alpha"));

    let disabled = config.src_dir().join("disabled.a.html");
    std::fs::write(&disabled, "ignored").unwrap();
    drive(&orchestrator, &disabled, EventKind::Create).await;

    assert!(!config.output_dir().join("a.html").exists());
    // The cascade refreshed b without a's nav entry.
    assert!(!read_output(&orchestrator, "b.html").contains("Alpha"));
}
