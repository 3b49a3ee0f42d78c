use faultline_cli::colors::Palette;
use faultline_cli::commands::{self, Context};
use faultline_cli::config::{LoadedConfig, CONFIG_FILE};
use faultline_cli::report::OutputFormat;
use faultline_cli::CliError;
use faultline_engine::{EngineConfig, SessionOutcome};
use std::path::PathBuf;

fn demo(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos/sum")
        .join(file)
}

fn context(format: OutputFormat) -> Context {
    Context {
        config: LoadedConfig {
            path: None,
            engine: EngineConfig::default(),
        },
        format,
        palette: Palette::plain(),
    }
}

#[test]
fn slice_lists_the_steps_the_output_depends_on() {
    let out = commands::cmd_slice(&context(OutputFormat::Json), &demo("trace.json"), None).unwrap();
    let steps: serde_json::Value = serde_json::from_str(&out).unwrap();
    let orders: Vec<u64> = steps
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["order"].as_u64().unwrap())
        .collect();
    assert_eq!(orders, vec![1, 2, 3, 4, 7]);
}

#[test]
fn slice_from_an_explicit_step() {
    let out = commands::cmd_slice(&context(OutputFormat::Text), &demo("trace.json"), Some(5)).unwrap();
    assert!(out.contains("#5 Sum.java:7"));
    assert!(out.ends_with("3 steps in slice"));
}

#[test]
fn propagate_scores_every_slice_step() {
    let out = commands::cmd_propagate(&context(OutputFormat::Json), &demo("trace.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    let steps = value["steps"].as_object().unwrap();
    assert_eq!(steps.len(), 5);
    for p in steps.values() {
        let p = p.as_f64().unwrap();
        assert!((0.0..=1.0).contains(&p));
    }
    // Nothing the print reads can tell it apart from a correct step.
    assert!((steps["7"].as_f64().unwrap() - 0.5).abs() < 1e-9);
}

#[test]
fn path_starts_at_the_output() {
    let out = commands::cmd_path(&context(OutputFormat::Json), &demo("trace.json"), Some(2)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    let path = value["path"].as_array().unwrap();
    assert_eq!(path[0]["step"], 7);
    assert_eq!(path.last().unwrap()["step"], 2);
    assert_eq!(path.last().unwrap()["feedbacks"][0]["type"], "root_cause");
}

#[test]
fn scripted_locate_finds_the_bad_initialization() {
    let out = commands::cmd_locate(
        &context(OutputFormat::Json),
        &demo("trace.json"),
        Some(&demo("oracle.json")),
    )
    .unwrap();
    let outcome: SessionOutcome = serde_json::from_str(&out).unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::RootCause {
            step: faultline_core::StepOrder(2)
        }
    );
}

#[test]
fn missing_trace_names_the_file() {
    let err = commands::cmd_slice(&context(OutputFormat::Text), &demo("nope.json"), None).unwrap_err();
    assert!(matches!(err, CliError::Trace { .. }));
    assert!(err.to_string().contains("nope.json"));
}

#[test]
fn init_refuses_to_overwrite() {
    let dir = std::env::temp_dir().join(format!("faultline-init-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let path = commands::cmd_init(&dir).unwrap();
    assert_eq!(path, dir.join(CONFIG_FILE));
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        EngineConfig::from_toml_str(&written).unwrap(),
        EngineConfig::default()
    );
    assert!(matches!(
        commands::cmd_init(&dir),
        Err(CliError::AlreadyExists(_))
    ));
    std::fs::remove_dir_all(&dir).unwrap();
}
