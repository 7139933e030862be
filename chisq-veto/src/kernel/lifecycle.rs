use core::fmt;

use super::ConfigError;

/// Constructor validation lifecycle shared by kernel structs.
pub trait KernelLifecycle: Sized {
    /// Kernel config type.
    type Config;

    /// Construct a validated kernel from config.
    fn try_new(config: Self::Config) -> Result<Self, ConfigError>;
}

/// States of a workspace-owning veto handle.
///
/// ```text
/// Uninitialized --init--> Ready --veto--> Computing --> Ready
///                           |
///                           +--finalize--> Finalized
/// ```
///
/// `Computing` is only observable after a computation unwound mid-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// No workspace has been allocated yet.
    #[default]
    Uninitialized,
    /// Workspace is allocated and idle.
    Ready,
    /// A veto computation is running on the workspace.
    Computing,
    /// Workspace has been released.
    Finalized,
}

impl LifecycleState {
    /// Short lowercase name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Ready => "ready",
            LifecycleState::Computing => "computing",
            LifecycleState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a `(num_bins, num_samples)` pair used to size veto workspaces.
pub fn validate_bins_and_samples(num_bins: usize, num_samples: usize) -> Result<(), ConfigError> {
    if num_samples == 0 {
        return Err(ConfigError::InvalidSampleCount { got: num_samples });
    }
    if num_bins == 0 || num_bins >= num_samples {
        return Err(ConfigError::InvalidBinCount {
            num_bins,
            limit: num_samples,
        });
    }
    Ok(())
}
