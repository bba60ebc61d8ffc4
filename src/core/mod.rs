//! Driver core: registry, process control, launch and host inspection.

pub mod control;
pub mod diagnostics;
pub mod driver;
pub mod events;
pub mod hostinfo;
pub mod launch;
pub mod lock;
pub mod netscript;
pub mod outcome;
pub mod params;
pub mod process;
pub mod registry;
pub mod reporter;
pub mod store;

pub use diagnostics::{Diagnostic, Severity};
pub use driver::Driver;
pub use events::{Event, ShutdownOutcome, ShutdownSignal};
pub use launch::LaunchSpec;
pub use outcome::{
    InstanceInfo, NodeInfo, OperationOutput, OperationResult, RebootOutcome, StartOutcome,
    StopOutcome,
};
pub use params::HvParams;
pub use process::{ProcessProbe, ProcfsProbe};
pub use registry::{PidState, ProcessRegistry};
pub use reporter::{LogReporter, Reporter};
pub use store::{FileStore, KeyedStore};
