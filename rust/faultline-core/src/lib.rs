//! Faultline Core
//!
//! Recorded-trace data model consumed by the inference engine: steps, variable
//! occurrences, the order-indexed trace arena, and trace file loading.

pub mod file;
pub mod step;
pub mod trace;

pub use file::{LoadedTrace, OutputSpec, TraceFile};
pub use step::{StepOrder, TraceStep, VarId, VariableValue};
pub use trace::{Trace, TraceError};
