use faultline_core::TraceError;
use faultline_engine::{ConfigError, EngineError, ScriptError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("cannot load trace '{}'", path.display())]
    Trace {
        path: PathBuf,
        #[source]
        source: TraceError,
    },
    #[error(transparent)]
    Slice(#[from] TraceError),
    #[error("invalid config '{}'", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("I/O error on '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot load oracle script '{}'", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: ScriptError,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("cannot write to the terminal")]
    Output(#[from] std::io::Error),
    #[error("line editor failed")]
    Readline(#[from] rustyline::error::ReadlineError),
    #[error("cannot encode output")]
    Json(#[from] serde_json::Error),
    #[error("{} already exists; not overwriting", .0.display())]
    AlreadyExists(PathBuf),
}
