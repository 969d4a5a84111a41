// tests/build_pipeline.rs
//
// End-to-end builds on a real directory tree.

use std::path::Path;
use std::sync::Arc;

use assetpipe::config::{ConfigFile, TemplateOptions, TransformConfig};
use assetpipe::dag::{LeafStatus, RunReport, RunStatus, TaskExpr, TaskRegistry};
use assetpipe::engine::run_expression;
use assetpipe::errors::PipelineError;
use assetpipe::fs::RealFileSystem;
use assetpipe_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder, par, seq};
use assetpipe_test_utils::tree::{snapshot, write_tree};
use assetpipe_test_utils::{init_tracing, with_timeout};

/// Fails on any input containing `@broken`, echoes everything else.
#[cfg(unix)]
const FAKE_SCSS: &str =
    "awk '/@broken/ { print \"unexpected token\" > \"/dev/stderr\"; exit 1 } { print }'";

fn site(root: &Path) {
    write_tree(
        root,
        &[
            ("src/css/site.css", "body { margin: 0 }\n"),
            ("src/css/vendor/reset.css", "* { box-sizing: border-box }\n"),
            ("src/css/_draft.css", "draft\n"),
            ("src/js/a.js", "const a = 1;\n"),
            ("src/js/b.js", "const b = 2;\n"),
            ("src/fonts/inter.woff2", "\u{1}\u{2}binary"),
            ("src/templates/index.hbs", "<h1>{{title}}</h1>{{> footer}}"),
            ("src/partials/footer.hbs", "<footer>{{owner}}</footer>"),
            ("data.toml", "title = \"Home\"\nowner = \"ACME\"\n"),
        ],
    );
}

fn site_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_data_file("data.toml")
        .with_default_exclude("**/_*")
        .with_task("clean", TaskConfigBuilder::clean("dist").build())
        .with_task(
            "css",
            TaskConfigBuilder::transform(&["src/css/**/*.css"], "dist/css")
                .suffix(".min")
                .build(),
        )
        .with_task(
            "js",
            TaskConfigBuilder::transform(&["src/js/*.js"], "dist/js")
                .concat("app.js")
                .replace("const", "let")
                .build(),
        )
        .with_task(
            "fonts",
            TaskConfigBuilder::transform(&["src/fonts/*"], "dist/fonts").build(),
        )
        .with_task(
            "templates",
            TaskConfigBuilder::transform(&["src/templates/*.hbs"], "dist")
                .with(TransformConfig::Template(TemplateOptions {
                    partials: Some("src/partials".to_string()),
                    ..Default::default()
                }))
                .extname(".html")
                .build(),
        )
        .with_pipeline("assets", par(&["css", "js", "fonts", "templates"]))
        .with_pipeline("build", seq(&["clean", "assets"]))
        .build()
}

fn registry(cfg: &ConfigFile, root: &Path) -> Arc<TaskRegistry> {
    Arc::new(TaskRegistry::from_config(cfg, root, Arc::new(RealFileSystem)).unwrap())
}

async fn build(registry: &Arc<TaskRegistry>, target: &str) -> RunReport {
    with_timeout(run_expression(registry.clone(), target, TaskExpr::task(target)))
        .await
        .unwrap()
}

#[tokio::test]
async fn build_writes_expected_outputs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let reg = registry(&site_config(), dir.path());

    let report = build(&reg, "build").await;
    assert_eq!(report.status, RunStatus::Succeeded, "{:?}", report.errors);

    let out = snapshot(&dir.path().join("dist"));
    let files: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(
        files,
        vec![
            "css/site.min.css",
            "css/vendor/reset.min.css",
            "fonts/inter.woff2",
            "index.html",
            "js/app.js",
        ]
    );
    assert_eq!(out["index.html"], b"<h1>Home</h1><footer>ACME</footer>");
    assert_eq!(out["js/app.js"], b"let a = 1;\nlet b = 2;\n");
    assert_eq!(out["fonts/inter.woff2"], "\u{1}\u{2}binary".as_bytes());
}

#[tokio::test]
async fn building_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let reg = registry(&site_config(), dir.path());

    assert!(build(&reg, "assets").await.is_success());
    let first = snapshot(&dir.path().join("dist"));
    assert!(build(&reg, "assets").await.is_success());
    let second = snapshot(&dir.path().join("dist"));

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn rebuild_picks_up_edited_partials_and_data() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let reg = registry(&site_config(), dir.path());

    assert!(build(&reg, "templates").await.is_success());
    let page = dir.path().join("dist/index.html");
    assert_eq!(std::fs::read_to_string(&page).unwrap(), "<h1>Home</h1><footer>ACME</footer>");

    // Same registry, as in a watch session.
    write_tree(
        dir.path(),
        &[
            ("src/partials/footer.hbs", "<footer>&copy; {{owner}}</footer>{{> missing}}"),
            ("data.toml", "title = \"About\"\nowner = \"Initech\"\n"),
        ],
    );
    assert!(build(&reg, "templates").await.is_success());
    assert_eq!(
        std::fs::read_to_string(&page).unwrap(),
        "<h1>About</h1><footer>&copy; Initech</footer>"
    );
}

#[tokio::test]
async fn broken_data_file_fails_only_template_task() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let reg = registry(&site_config(), dir.path());

    write_tree(dir.path(), &[("data.toml", "title = ")]);
    let report = build(&reg, "assets").await;

    assert_eq!(report.leaf("templates"), Some(LeafStatus::Failed));
    assert_eq!(report.leaf("css"), Some(LeafStatus::Succeeded));
    assert!(report.errors[0].1.contains("data.toml"), "{:?}", report.errors);
}

#[tokio::test]
async fn clean_then_build_matches_build_on_clean_tree() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    let reg = registry(&site_config(), dir.path());

    assert!(build(&reg, "assets").await.is_success());
    let fresh = snapshot(&dir.path().join("dist"));

    // Leave a stale file behind; `build` cleans first.
    write_tree(dir.path(), &[("dist/css/old.css", "stale")]);
    assert!(build(&reg, "build").await.is_success());

    assert_eq!(snapshot(&dir.path().join("dist")), fresh);
}

#[cfg(unix)]
#[tokio::test]
async fn broken_scss_fails_styles_but_css_succeeds() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("src/css/site.css", "body {}\n"),
            ("styles/a.scss", "$x: 1;\n"),
            ("styles/broken.scss", "@broken {\n"),
        ],
    );
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "css",
            TaskConfigBuilder::transform(&["src/css/*.css"], "dist/css").build(),
        )
        .with_task(
            "scss",
            TaskConfigBuilder::transform(&["styles/*.scss"], "dist/css")
                .command_transform(FAKE_SCSS)
                .extname(".css")
                .build(),
        )
        .with_pipeline("styles", par(&["css", "scss"]))
        .build();
    let reg = registry(&cfg, dir.path());

    let report = build(&reg, "styles").await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.leaf("css"), Some(LeafStatus::Succeeded));
    assert_eq!(report.leaf("scss"), Some(LeafStatus::Failed));

    let (task, message) = &report.errors[0];
    assert_eq!(task, "scss");
    assert!(message.contains("broken.scss"), "{message}");
    assert!(message.contains("unexpected token"), "{message}");

    // Siblings already written are kept.
    let out = snapshot(&dir.path().join("dist/css"));
    assert!(out.contains_key("site.css"));
    assert!(out.contains_key("a.css"));
    assert!(!out.contains_key("broken.css"));
}

#[cfg(unix)]
#[tokio::test]
async fn failing_command_in_sequence_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new()
        .with_task("first", TaskConfigBuilder::cmd("touch first.txt").build())
        .with_task("boom", TaskConfigBuilder::cmd("exit 7").build())
        .with_task("last", TaskConfigBuilder::cmd("touch last.txt").build())
        .with_pipeline("chain", seq(&["first", "boom", "last"]))
        .build();
    let reg = registry(&cfg, dir.path());

    let report = build(&reg, "chain").await;

    assert_eq!(report.started_order, vec!["first", "boom"]);
    assert_eq!(report.leaf("last"), Some(LeafStatus::Skipped));
    assert!(dir.path().join("first.txt").exists());
    assert!(!dir.path().join("last.txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn timed_out_task_fails_its_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "hang",
            TaskConfigBuilder::cmd("sleep 30").timeout("200ms").build(),
        )
        .build();
    let reg = registry(&cfg, dir.path());

    let report = build(&reg, "hang").await;

    assert_eq!(report.leaf("hang"), Some(LeafStatus::Failed));
    assert!(report.errors[0].1.contains("timed out"));
}

#[tokio::test]
async fn unknown_target_is_rejected_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let reg = registry(&site_config(), dir.path());

    let err = run_expression(reg, "deploy", TaskExpr::task("deploy"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownTask(name) if name == "deploy"));
}
