//! Composite keys for rate limit entries.

/// A key that uniquely identifies a rate limit entry.
///
/// Quota is partitioned by category first and identifier second; the string
/// form is `category:identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// The category whose policy applies
    pub category: String,
    /// The caller, typically a user id or `"anonymous"`
    pub identifier: String,
}

impl LimitKey {
    /// Create a new key.
    pub fn new(category: &str, identifier: &str) -> Self {
        Self {
            category: category.to_string(),
            identifier: identifier.to_string(),
        }
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.category, self.identifier)
    }
}
