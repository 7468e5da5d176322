//! Session attachables.
//!
//! Credential, SSH-agent and secret providers are built outside this
//! workspace. The only thing the build path needs from them is a name for
//! diagnostics and, for providers that report their own progress, a way to
//! hand them a log channel.

use crate::types::StatusSender;

/// A capability-bearing object attached to the build session
pub trait Attachable: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Providers that emit progress of their own expose it here
    fn as_log_source(&self) -> Option<&dyn LogSource> {
        None
    }
}

/// Attachables that can stream status records into the build progress
pub trait LogSource: Send + Sync {
    /// Register the channel the attachable writes its status records to.
    ///
    /// The receiving side is closed once the solve finishes; sends after that
    /// point fail and should be ignored.
    fn set_logger(&self, logger: StatusSender);
}
