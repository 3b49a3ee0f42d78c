//! One function per `faultline` subcommand. Each returns the text to print.

use crate::colors::Palette;
use crate::config::{LoadedConfig, CONFIG_FILE};
use crate::error::CliError;
use crate::interactive::run_interactive;
use crate::report::{render_beliefs, render_outcome, render_path, render_slice, OutputFormat};
use faultline_core::{LoadedTrace, StepOrder, TraceFile};
use faultline_engine::{
    Boundary, OracleScript, PathFinder, Propagator, RootCauseSelector, ScriptedOracle, Session,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Shared options of every command that reads a trace.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: LoadedConfig,
    pub format: OutputFormat,
    pub palette: Palette,
}

pub fn load_trace(path: &Path) -> Result<LoadedTrace, CliError> {
    let loaded = TraceFile::load(path)
        .and_then(TraceFile::into_trace)
        .map_err(|source| CliError::Trace {
            path: path.to_path_buf(),
            source,
        })?;
    info!(
        path = %path.display(),
        steps = loaded.trace.len(),
        output = %loaded.output_step,
        fingerprint = %loaded.fingerprint,
        "trace loaded"
    );
    Ok(loaded)
}

pub fn cmd_slice(ctx: &Context, trace: &Path, step: Option<u32>) -> Result<String, CliError> {
    let loaded = load_trace(trace)?;
    let from = step.map(StepOrder).unwrap_or(loaded.output_step);
    let slice = loaded.trace.backward_slice(from)?;
    render_slice(&loaded.trace, &slice, ctx.format, &ctx.palette)
}

pub fn cmd_propagate(ctx: &Context, trace: &Path) -> Result<String, CliError> {
    let loaded = load_trace(trace)?;
    let boundary = Boundary::from_loaded(&loaded);
    let labels = boundary.initial_labels(&loaded.trace)?;
    let slice = loaded.trace.backward_slice(boundary.output_step)?;
    let beliefs = Propagator::from_config(&loaded.trace, &ctx.config.engine.propagation)
        .propagate(&slice, &labels)?;
    render_beliefs(&loaded.trace, &beliefs, ctx.format, &ctx.palette)
}

/// One propagation, one candidate, one path. `end` overrides the selected
/// candidate.
pub fn cmd_path(ctx: &Context, trace: &Path, end: Option<u32>) -> Result<String, CliError> {
    let loaded = load_trace(trace)?;
    let engine = &ctx.config.engine;
    let boundary = Boundary::from_loaded(&loaded);
    let labels = boundary.initial_labels(&loaded.trace)?;
    let output = boundary.output_step;
    let slice = loaded.trace.backward_slice(output)?;
    let beliefs = Propagator::from_config(&loaded.trace, &engine.propagation)
        .propagate(&slice, &labels)?;
    let end = match end {
        Some(step) => StepOrder(step),
        None => RootCauseSelector::from_config(&engine.selection).select(&slice, &beliefs, &labels, output),
    };
    let found = PathFinder::build(&loaded.trace, &slice, &beliefs)
        .and_then(|finder| finder.find_path(output, end))
        .map_err(faultline_engine::EngineError::from)?;
    render_path(&loaded.trace, &found, ctx.format, &ctx.palette)
}

/// A full refinement session, answered by `script` when given and at the
/// terminal otherwise.
pub fn cmd_locate(ctx: &Context, trace: &Path, script: Option<&Path>) -> Result<String, CliError> {
    let loaded = load_trace(trace)?;
    let boundary = Boundary::from_loaded(&loaded);
    let view = loaded.trace.clone();
    let handle = Session::spawn(loaded.trace, boundary, ctx.config.engine.clone())?;
    info!(session = %handle.id(), "session spawned");

    let outcome = match script {
        Some(path) => {
            let script = OracleScript::load(path).map_err(|source| CliError::Script {
                path: path.to_path_buf(),
                source,
            })?;
            ScriptedOracle::new(script).drive(handle.oracle());
            handle.join()?
        }
        None => run_interactive(handle, &view, &ctx.palette)?,
    };
    render_outcome(&outcome, &view, ctx.format, &ctx.palette)
}

/// Write the config template into `dir`.
pub fn cmd_init(dir: &Path) -> Result<PathBuf, CliError> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        return Err(CliError::AlreadyExists(path));
    }
    std::fs::write(&path, faultline_engine::EngineConfig::default_template()).map_err(|source| {
        CliError::Io {
            path: path.clone(),
            source,
        }
    })?;
    Ok(path)
}
