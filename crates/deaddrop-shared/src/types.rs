use serde::{Deserialize, Serialize};

/// Opaque, stable user identifier.
///
/// Assigned once at registration and never changed. Identifiers appear in
/// remote-store directory names, so registration restricts them to a
/// path-safe alphabet (see [`UserId::is_valid`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is safe to embed in a remote-store path.
    ///
    /// Allowed: ASCII alphanumerics, `_` and `.`. The channel-key separator
    /// `-` and path separators are rejected so derived paths stay unambiguous.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What an envelope carries: plain text or a reference to a file attachment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_validation() {
        assert!(UserId::from("alice").is_valid());
        assert!(UserId::from("user_2.b").is_valid());
        assert!(!UserId::from("").is_valid());
        assert!(!UserId::from("a-b").is_valid());
        assert!(!UserId::from("../etc").is_valid());
        assert!(!UserId::from("a/b").is_valid());
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!(MessageKind::from_str("text"), Some(MessageKind::Text));
        assert_eq!(MessageKind::from_str("file"), Some(MessageKind::File));
        assert_eq!(MessageKind::from_str("video"), None);
        assert_eq!(MessageKind::Text.as_str(), "text");
    }
}
