use std::io::ErrorKind;

use smtpload_metrics::ErrorCategory;

use super::error::SessionError;

/// Reply codes counted as protocol rejections.
pub const NEGATIVE_COMPLETION_CODES: [u16; 4] = [500, 501, 503, 550];

/// Map a failed transaction to its category.
///
/// Order matters: timeouts, then refused, then reset, then protocol rejections.
#[must_use]
pub fn classify(cause: &SessionError) -> ErrorCategory {
    match cause {
        SessionError::Timeout { .. } => ErrorCategory::Timeout,
        SessionError::Io { source, .. } => classify_io(source),
        SessionError::UnexpectedReply { code, line, .. } => match code {
            Some(code) if NEGATIVE_COMPLETION_CODES.contains(code) => ErrorCategory::ProtocolError,
            Some(_) => ErrorCategory::Other,
            None => classify_text(line),
        },
        SessionError::Closed { .. } => ErrorCategory::Other,
    }
}

fn classify_io(err: &std::io::Error) -> ErrorCategory {
    match err.kind() {
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        ErrorKind::ConnectionRefused => ErrorCategory::ConnectionRefused,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            ErrorCategory::ConnectionReset
        }
        _ => classify_text(&err.to_string()),
    }
}

/// Same ordering as [`classify`], for causes that only exist as text.
#[must_use]
pub fn classify_text(text: &str) -> ErrorCategory {
    let lower = text.to_ascii_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") {
        ErrorCategory::Timeout
    } else if lower.contains("connection refused") {
        ErrorCategory::ConnectionRefused
    } else if lower.contains("connection reset") || lower.contains("reset by peer") {
        ErrorCategory::ConnectionReset
    } else if has_negative_completion_code(&lower) {
        ErrorCategory::ProtocolError
    } else {
        ErrorCategory::Other
    }
}

fn has_negative_completion_code(text: &str) -> bool {
    text.split(|c: char| !c.is_ascii_digit())
        .filter_map(|tok| tok.parse::<u16>().ok())
        .any(|code| NEGATIVE_COMPLETION_CODES.contains(&code))
}
