/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A one-shot alert handed to the presentation layer.
///
/// `blocking` notices must be acknowledged before the screen changes;
/// the ride screens use them for terminal conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
    pub blocking: bool,
}

impl Notice {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            body: body.into(),
            blocking: false,
        }
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            title: title.into(),
            body: body.into(),
            blocking: false,
        }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            body: body.into(),
            blocking: false,
        }
    }

    /// Builds an error notice from an optional server message, falling
    /// back to `fallback` when the server said nothing useful.
    pub fn from_server(title: impl Into<String>, message: Option<&str>, fallback: &str) -> Self {
        let body = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback);
        Self::error(title, body)
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }
}
