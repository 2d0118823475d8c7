use std::time::Duration;

use smtpload_metrics::ErrorCategory;

use super::classify::classify;
use super::reply::Reply;

/// Transaction step at which a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Connect,
    Greeting,
    Ehlo,
    MailFrom,
    RcptTo,
    Data,
    Body,
    EndOfData,
    Quit,
}

/// Why a single transaction failed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{stage}: operation timed out after {timeout:?}")]
    Timeout { stage: Stage, timeout: Duration },

    #[error("{stage}: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage}: unexpected reply `{line}` (expected {expected})")]
    UnexpectedReply {
        stage: Stage,
        expected: u16,
        code: Option<u16>,
        line: String,
    },

    #[error("{stage}: connection closed by server")]
    Closed { stage: Stage },
}

impl SessionError {
    pub(crate) fn unexpected(stage: Stage, expected: u16, reply: Reply) -> Self {
        Self::UnexpectedReply {
            stage,
            expected,
            code: reply.code,
            line: reply.line,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Timeout { stage, .. }
            | Self::Io { stage, .. }
            | Self::UnexpectedReply { stage, .. }
            | Self::Closed { stage } => *stage,
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        classify(self)
    }
}
