/// One server reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit status, if the line starts with one.
    pub code: Option<u16>,
    /// True only for `NNN ` or a bare `NNN`; anything else is read as a continuation.
    pub last: bool,
    /// The line without its line terminator.
    pub line: String,
}

impl Reply {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let line = raw.trim_end_matches(['\r', '\n']).to_string();
        let bytes = line.as_bytes();

        let code = match bytes.get(..3) {
            Some(digits) if digits.iter().all(u8::is_ascii_digit) => {
                line.get(..3).and_then(|s| s.parse().ok())
            }
            _ => None,
        };
        let last = matches!(bytes.get(3), None | Some(b' '));

        Self { code, last, line }
    }

    #[must_use]
    pub fn is(&self, code: u16) -> bool {
        self.code == Some(code)
    }
}
