pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("at least one target server is required")]
    NoServers,

    #[error("target server names must not be empty")]
    EmptyServer,

    #[error("`messages` must be a positive integer")]
    InvalidMessages,

    #[error("`workers` must be a positive integer")]
    InvalidWorkers,

    #[error("`rate` must be a positive, finite number of messages per second")]
    InvalidRate,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`max_in_flight` must be a positive integer")]
    InvalidMaxInFlight,

    #[error("`{0}` timeout must be a positive duration")]
    InvalidTimeout(&'static str),

    #[error("invalid resource sampler `{0}` (expected docker, host or process)")]
    InvalidSampler(String),
}
