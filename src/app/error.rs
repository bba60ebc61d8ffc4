use std::process::ExitCode;

use crate::Error;

/// Process exit status for each failure kind, following sysexits(3).
pub fn exit_code(err: &Error) -> ExitCode {
    match err {
        Error::AlreadyRunning { .. } => ExitCode::from(75),
        Error::LaunchFailed { .. } => ExitCode::from(70),
        Error::LaunchUnverified { .. } => ExitCode::from(70),
        Error::NetScriptFailed { .. } => ExitCode::from(73),
        Error::GracefulShutdownFailed { .. } => ExitCode::from(69),
        Error::KillFailed { .. } => ExitCode::from(70),
        Error::InvalidParameter { .. } => ExitCode::from(65),
        Error::NodeInfoUnavailable { .. } => ExitCode::from(74),
        Error::NotFound { .. } => ExitCode::from(66),
        Error::InfoUnavailable { .. } => ExitCode::from(74),
        Error::StateDir { .. } => ExitCode::from(74),
        Error::PidFile { .. } => ExitCode::from(74),
        Error::InvalidKey { .. } => ExitCode::from(65),
        Error::LockUnavailable { .. } => ExitCode::from(75),
        Error::Lock { .. } => ExitCode::from(75),
        Error::ReadConfig { .. } => ExitCode::from(74),
        Error::ParseConfig { .. } => ExitCode::from(65),
        Error::InvalidConfig { .. } => ExitCode::from(65),
    }
}
