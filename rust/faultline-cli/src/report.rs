//! Text and JSON renderings of engine results.

use crate::colors::{Color, Palette};
use crate::error::CliError;
use faultline_core::{StepOrder, Trace};
use faultline_engine::{Beliefs, FoundPath, SessionOutcome, Snapshot};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn step_line(trace: &Trace, order: StepOrder, palette: &Palette) -> String {
    let Some(step) = trace.step(order) else {
        return format!("#{}", order);
    };
    let mut line = palette.paint(Color::Bold, &step.label());
    if !step.reads.is_empty() {
        let reads: Vec<&str> = step.reads.iter().map(|v| v.display_name()).collect();
        line.push_str(&format!("  {} {}", palette.paint(Color::Gray, "reads"), reads.join(", ")));
    }
    if !step.writes.is_empty() {
        let writes: Vec<&str> = step.writes.iter().map(|v| v.display_name()).collect();
        line.push_str(&format!("  {} {}", palette.paint(Color::Gray, "writes"), writes.join(", ")));
    }
    if let Some(dom) = step.control_dominator {
        line.push_str(&format!("  {} #{}", palette.paint(Color::Gray, "under"), dom));
    }
    line
}

pub fn render_slice(
    trace: &Trace,
    slice: &[StepOrder],
    format: OutputFormat,
    palette: &Palette,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => {
            let steps: Vec<_> = slice.iter().filter_map(|s| trace.step(*s)).collect();
            to_json(&steps)
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for order in slice {
                out.push_str(&format!("  {}\n", step_line(trace, *order, palette)));
            }
            out.push_str(&format!("{} steps in slice", slice.len()));
            Ok(out)
        }
    }
}

pub fn render_beliefs(
    trace: &Trace,
    beliefs: &Beliefs,
    format: OutputFormat,
    palette: &Palette,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => to_json(&json!({
            "iterations": beliefs.iterations(),
            "converged": beliefs.converged(),
            "steps": beliefs.steps(),
        })),
        OutputFormat::Text => {
            let mut out = String::new();
            for (order, p) in beliefs.steps() {
                let label = trace.step(*order).map(|s| s.label()).unwrap_or_default();
                out.push_str(&format!("  {}  {}\n", palette.probability(*p), label));
            }
            let status = if beliefs.converged() {
                "converged"
            } else {
                "did not converge"
            };
            out.push_str(&format!("{} after {} iterations", status, beliefs.iterations()));
            Ok(out)
        }
    }
}

pub fn render_path(
    trace: &Trace,
    found: &FoundPath,
    format: OutputFormat,
    palette: &Palette,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => to_json(&json!({
            "weight": found.weight,
            "path": found.path,
        })),
        OutputFormat::Text => {
            let mut out = String::new();
            for edge in found.path.iter() {
                let label = trace.step(edge.step).map(|s| s.label()).unwrap_or_default();
                out.push_str(&format!(
                    "  {:<28} {}\n",
                    label,
                    palette.paint(Color::Cyan, &edge.primary().to_string())
                ));
            }
            out.push_str(&format!("weight {:.4}", found.weight));
            Ok(out)
        }
    }
}

/// The path a session shows the oracle, with each step's belief.
pub fn render_snapshot(trace: &Trace, snapshot: &Snapshot, palette: &Palette) -> String {
    let mut out = String::new();
    for edge in snapshot.path.iter() {
        let p = snapshot
            .step_probabilities
            .get(&edge.step)
            .map(|p| palette.probability(*p))
            .unwrap_or_else(|| "  -   ".to_string());
        let note = snapshot
            .annotations
            .get(&edge.step)
            .map(|r| palette.paint(Color::Gray, &format!("({})", r)))
            .unwrap_or_default();
        out.push_str(&format!(
            "  {}  {:<28} {} {}\n",
            p,
            step_line(trace, edge.step, palette),
            palette.paint(Color::Cyan, &edge.primary().to_string()),
            note
        ));
    }
    out
}

pub fn render_outcome(
    outcome: &SessionOutcome,
    trace: &Trace,
    format: OutputFormat,
    palette: &Palette,
) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        return to_json(outcome);
    }
    Ok(match outcome {
        SessionOutcome::RootCause { step } => format!(
            "{} {}",
            palette.paint(Color::Green, "root cause:"),
            trace.step(*step).map(|s| s.label()).unwrap_or_else(|| format!("#{}", step))
        ),
        SessionOutcome::Omission(report) => {
            format!("{} {}", palette.paint(Color::Yellow, "omission:"), report)
        }
        SessionOutcome::Stopped => palette.paint(Color::Gray, "session stopped"),
        SessionOutcome::RoundLimit { rounds } => format!(
            "{} no root cause after {} rounds",
            palette.paint(Color::Red, "gave up:"),
            rounds
        ),
    })
}
