use std::fmt::Write as _;

/// Bytes left unfilled below the requested size.
pub const BODY_MARGIN: usize = 100;

const PREAMBLE: &str = "From: loadgen@test.local\r\n\
To: test@example.com\r\n\
Subject: Load Test Message\r\n\
\r\n\
This is a test message from the load generator.\r\n\
It contains multiple lines of text.\r\n\
Each line is kept short.\r\n";

/// Message body of roughly `size_bytes`.
///
/// Numbered filler lines are appended until the body reaches `size_bytes - BODY_MARGIN`,
/// so the result never overshoots that point by more than one line. Every line ends in
/// CRLF and no line is a lone `.`.
#[must_use]
pub fn generate_body(size_bytes: usize) -> String {
    let target = size_bytes.saturating_sub(BODY_MARGIN);
    let mut body = String::with_capacity(target.max(PREAMBLE.len()) + 32);
    body.push_str(PREAMBLE);

    while body.len() < target {
        let offset = body.len();
        let _ = write!(body, "Test line number {offset}.\r\n");
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    // Longest filler line produced for bodies up to 1 MiB.
    const MAX_LINE: usize = "Test line number 1048576.\r\n".len();

    #[test]
    fn length_stays_within_one_line_of_target() {
        for size in [300, 301, 512, 1024, 4096, 10 * 1024, 100 * 1024, 1024 * 1024] {
            let len = generate_body(size).len();
            assert!(
                len >= size - BODY_MARGIN - MAX_LINE && len <= size,
                "size={size} len={len}"
            );
            assert!(len >= size - BODY_MARGIN, "size={size} len={len}");
        }
    }

    #[test]
    fn deterministic_and_monotonic() {
        assert_eq!(generate_body(4096), generate_body(4096));

        let mut prev = 0;
        for size in (0..20_000).step_by(97) {
            let len = generate_body(size).len();
            assert!(len >= prev, "size={size} len={len} prev={prev}");
            prev = len;
        }
    }

    #[test]
    fn tiny_sizes_still_carry_headers() {
        let body = generate_body(0);
        assert_eq!(body, PREAMBLE);
        assert!(body.starts_with("From: "));
        assert!(body.contains("\r\n\r\n"));
    }

    #[test]
    fn lines_are_crlf_terminated_and_short() {
        let body = generate_body(64 * 1024);
        assert!(body.ends_with("\r\n"));
        for line in body.split("\r\n") {
            assert!(line.len() < 998);
            assert_ne!(line, ".");
        }
    }
}
