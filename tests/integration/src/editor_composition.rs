//! End-to-end composition of a small editor
//!
//! Exercises the complete flow: override files -> graph resolution ->
//! host construction -> lifecycle passes -> teardown.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use compose_config::OverrideResolver;
use compose_core::{
    Cleanup, Composer, Contributions, Error, Extension, HostConfig, compose_extensions,
};
use compose_test_utils::EventLog;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::json;
use tempfile::TempDir;

/// Stand-in for the runtime an editor would build from the host config.
#[derive(Debug)]
struct Editor {
    config: HostConfig,
    schema: Vec<String>,
    plugins: Vec<String>,
    listeners: Rc<RefCell<Vec<String>>>,
}

impl Editor {
    fn new(config: HostConfig) -> Self {
        Self {
            schema: config.node_types.clone(),
            config,
            plugins: Vec::new(),
            listeners: Rc::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryConfig {
    depth: u32,
}

fn listener(editor: &mut Editor, name: &str, log: &EventLog) -> Cleanup {
    editor.listeners.borrow_mut().push(name.to_string());
    let listeners = Rc::clone(&editor.listeners);
    let log = log.clone();
    let name = name.to_string();
    Cleanup::infallible(move || {
        listeners.borrow_mut().retain(|l| l != &name);
        log.record(format!("detach:{name}"));
    })
}

struct Kit {
    document: Extension<Editor>,
    history: Extension<Editor>,
    heading: Extension<Editor>,
    shortcuts: Extension<Editor>,
    placeholder: Extension<Editor>,
}

fn kit(log: &EventLog) -> Kit {
    let document: Extension<Editor> = Extension::builder("document")
        .contributes(
            Contributions::new()
                .node_type("doc")
                .node_type("paragraph")
                .node_type("text")
                .option("editable", json!(true))
                .import("p", "paragraph")
                .export("paragraph", "p"),
        )
        .finish();

    let history_log = log.clone();
    let history = Extension::builder("history")
        .default_config(json!({"depth": 100}))
        .depends_on(&document)
        .on_build(|_editor, config, _ctx| {
            let config: HistoryConfig = serde_json::from_value(config.clone())?;
            Ok(config.depth)
        })
        .on_register(move |editor: &mut Editor, _config, _ctx| {
            editor.plugins.push("history".to_string());
            Ok(Some(listener(editor, "history", &history_log)))
        })
        .finish();

    let heading_log = log.clone();
    let heading = Extension::builder("heading")
        .default_config(json!({"levels": [1, 2, 3, 4, 5, 6]}))
        .depends_on(&document)
        .contributes(
            Contributions::new()
                .node_type("heading")
                .import("h1", "heading")
                .export("heading", "h1")
                .theme(json!({"heading": {"weight": "bold"}})),
        )
        .on_register(move |editor: &mut Editor, config, _ctx| {
            editor.plugins.push(format!("heading{}", config["levels"]));
            Ok(Some(listener(editor, "heading", &heading_log)))
        })
        .finish();

    let shortcuts = Extension::builder("shortcuts")
        .depends_on_with(&history, [json!({"depth": 50})])
        .peer_with("heading", json!({"levels": [1, 2]}))
        .on_after_initialization(|editor: &mut Editor, _config, ctx| {
            let depth = ctx.get_dependency("history")?.output::<u32>()?;
            let headings = match ctx.get_peer("heading")? {
                Some(heading) => heading.config()["levels"].to_string(),
                None => "none".to_string(),
            };
            editor
                .plugins
                .push(format!("shortcuts(depth={depth}, headings={headings})"));
            Ok(None)
        })
        .finish();

    let placeholder_log = log.clone();
    let placeholder = Extension::builder("placeholder")
        .default_config(json!({"text": "Write something..."}))
        .depends_on(&document)
        .contributes(
            Contributions::new()
                .theme(json!({"placeholder": {"color": "gray"}}))
                .option("editable", json!(true)),
        )
        .on_init(move |_editor, config, ctx| {
            placeholder_log.record(format!("placeholder signal live: {}", !ctx.signal().is_cancelled()));
            Ok(config["text"].as_str().unwrap_or_default().to_string())
        })
        .finish();

    Kit {
        document,
        history,
        heading,
        shortcuts,
        placeholder,
    }
}

#[test]
fn test_full_editor_composition() {
    let log = EventLog::new();
    let kit = kit(&log);
    let roots = [kit.shortcuts.clone(), kit.heading.clone(), kit.placeholder.clone()];

    let mut composer = Composer::new();
    for root in &roots {
        composer.add(root).unwrap();
    }
    assert_eq!(
        composer.sorted_names().unwrap(),
        vec!["document", "history", "heading", "shortcuts", "placeholder"]
    );

    let mut composition = composer.compose(Editor::new).unwrap();
    let editor = composition.host();

    assert_eq!(editor.schema, vec!["doc", "paragraph", "text", "heading"]);
    assert_eq!(editor.config.option("editable"), Some(&json!(true)));
    assert_eq!(
        editor.config.theme,
        json!({"heading": {"weight": "bold"}, "placeholder": {"color": "gray"}})
    );
    assert_eq!(
        editor.plugins,
        vec![
            "history",
            "heading[1,2]",
            "shortcuts(depth=50, headings=[1,2])",
        ]
    );
    assert_eq!(*editor.listeners.borrow(), vec!["history", "heading"]);
    assert_eq!(log.entries(), vec!["placeholder signal live: true"]);

    let placeholder = composition
        .registry()
        .get("placeholder")
        .unwrap()
        .init_result()
        .unwrap()
        .clone();
    assert_eq!(
        placeholder.downcast_ref::<String>().map(String::as_str),
        Some("Write something...")
    );

    let document = composition.registry().get("document").unwrap();
    assert!(document.extension().ptr_eq(&kit.document));

    composition.dispose().unwrap();
    composition.dispose().unwrap();
    assert!(composition.host().listeners.borrow().is_empty());
    assert_eq!(log.with_prefix("detach:"), vec!["heading", "history"]);
}

#[test]
fn test_absent_peer_leaves_shortcuts_working() {
    let log = EventLog::new();
    let kit = kit(&log);

    let composition = compose_extensions(&[kit.shortcuts.clone()], Editor::new).unwrap();
    assert_eq!(composition.host().schema, vec!["doc", "paragraph", "text"]);
    assert_eq!(
        composition.host().plugins,
        vec!["history", "shortcuts(depth=50, headings=none)"]
    );
}

#[test]
fn test_override_files_feed_the_editor() {
    let root = TempDir::new().unwrap();
    let global = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join(".compose")).unwrap();
    fs::write(
        global.path().join("overrides.toml"),
        "[extensions.\"placeholder\"]\ntext = \"Global hint\"\n",
    )
    .unwrap();
    fs::write(
        root.path().join(".compose/overrides.local.toml"),
        "[extensions.\"history\"]\ndepth = 7\n",
    )
    .unwrap();

    let log = EventLog::new();
    let kit = kit(&log);
    let manifest =
        OverrideResolver::with_global_config_dir(root.path(), global.path().to_path_buf())
            .resolve()
            .unwrap();

    let mut composer = Composer::new();
    composer.add(&kit.shortcuts).unwrap();
    composer.add(&kit.placeholder).unwrap();
    manifest.apply(&mut composer).unwrap();
    let composition = composer.compose(Editor::new).unwrap();

    assert_eq!(
        composition.host().plugins.last().map(String::as_str),
        Some("shortcuts(depth=7, headings=none)")
    );
    let hint = composition
        .registry()
        .get("placeholder")
        .unwrap()
        .init_result()
        .unwrap()
        .clone();
    assert_eq!(
        hint.downcast_ref::<String>().map(String::as_str),
        Some("Global hint")
    );
}

#[test]
fn test_competing_replacements_abort_before_hooks() {
    let log = EventLog::new();
    let kit = kit(&log);
    let fancy = Extension::builder("fancy-heading")
        .depends_on(&kit.heading)
        .contributes(Contributions::new().replace("heading", "fancy-heading"))
        .finish();
    let plain = Extension::builder("plain-heading")
        .depends_on(&kit.heading)
        .contributes(Contributions::new().replace("heading", "plain-heading"))
        .finish();

    let factory_called = Rc::new(RefCell::new(false));
    let called = Rc::clone(&factory_called);
    let result = compose_extensions(&[fancy, plain], move |config| {
        *called.borrow_mut() = true;
        Editor::new(config)
    });

    let err = result.err().unwrap();
    insta::assert_snapshot!(
        err.to_string(),
        @"replacement target 'heading' claimed by both 'fancy-heading' and 'plain-heading'"
    );
    assert!(!*factory_called.borrow());
    assert!(log.entries().is_empty());
}

#[test]
fn test_history_config_is_validated_at_build() {
    let log = EventLog::new();
    let kit = kit(&log);
    let mut composer = Composer::new();
    composer.add(&kit.history).unwrap();
    composer
        .override_config("history", json!({"depth": "deep"}))
        .unwrap();

    match composer.compose(Editor::new).err().unwrap() {
        Error::Hook {
            extension, phase, ..
        } => {
            assert_eq!(extension, "history");
            assert_eq!(phase.to_string(), "build");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(log.with_prefix("detach:").is_empty());
}
