#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,

    /// The run completed but at least one transaction failed.
    TransactionsFailed,

    /// Invalid CLI/config/options (bad flags, zero workers, non-positive rate, etc.).
    InvalidInput,

    /// Internal/runtime error (IO errors writing results, sampler start failures, join errors).
    RuntimeError,

    /// Interrupted by the user (Ctrl-C).
    Interrupted,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::TransactionsFailed | Self::RuntimeError => 1,
            Self::InvalidInput => 2,
            Self::Interrupted => 130,
        }
    }

    #[must_use]
    pub fn from_failures(failed: u64) -> Self {
        if failed == 0 {
            Self::Success
        } else {
            Self::TransactionsFailed
        }
    }
}
