mod body;
mod classify;
mod client;
mod error;
mod reply;

pub use body::{BODY_MARGIN, generate_body};
pub use classify::{NEGATIVE_COMPLETION_CODES, classify, classify_text};
pub use client::{SmtpClient, Transaction};
pub use error::{SessionError, Stage};
pub use reply::Reply;
