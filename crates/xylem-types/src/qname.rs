//! Qualified names and XML token validation.

use std::fmt;

/// A qualified name: optional prefix, local name and namespace URI.
///
/// Empty strings stand for an absent prefix or URI.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct QName {
    prefix: String,
    local_name: String,
    namespace_uri: String,
}

impl QName {
    /// Full constructor.
    #[must_use]
    pub fn new(
        namespace_uri: impl Into<String>,
        prefix: impl Into<String>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            local_name: local_name.into(),
            namespace_uri: namespace_uri.into(),
        }
    }

    /// A name with only a local part.
    #[must_use]
    pub fn local(local_name: impl Into<String>) -> Self {
        Self::new("", "", local_name)
    }

    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    #[inline]
    #[must_use]
    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    /// Whether prefix and local name are well-formed XML tokens.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if !is_nc_name(&self.local_name) {
            return false;
        }
        self.prefix.is_empty() || is_nc_name(&self.prefix)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.local_name)
        } else {
            write!(f, "{}:{}", self.prefix, self.local_name)
        }
    }
}

/// NCName start character (NameStartChar minus ':').
fn is_nc_name_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

/// NCName tail character.
fn is_nc_name_char(c: char) -> bool {
    is_nc_name_start(c) || c == '-' || c == '.' || c.is_ascii_digit() || c == '\u{00B7}'
}

/// Whether `s` is a well-formed NCName.
#[must_use]
pub fn is_nc_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_nc_name_start(c) => {}
        _ => return false,
    }
    chars.all(is_nc_name_char)
}

/// Whether comment content is legal: no "--" and no trailing "-".
#[must_use]
pub fn is_valid_comment(content: &str) -> bool {
    !content.contains("--") && !content.ends_with('-')
}

/// Whether processing-instruction content is legal: no "?>-" sequence.
#[must_use]
pub fn is_valid_pi_content(content: &str) -> bool {
    !content.contains("?>-")
}
