//! Scope types
//!
//! Every bean belongs to exactly one scope. The scope decides which context
//! holds its instances and whether callers receive the instance directly or
//! through a client proxy.

use std::fmt;
use std::sync::Arc;

/// A scope marker.
///
/// Normal scopes (`application`, `request`, ...) hand out client proxies, so a
/// consumer always reaches the instance of the currently active context.
/// Pseudo scopes (`dependent`, `singleton`) hand out the instance itself.
///
/// Two scope types are equal when their names are equal.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::ScopeType;
///
/// assert!(ScopeType::request().is_normal());
/// assert!(!ScopeType::dependent().is_normal());
///
/// let tenant = ScopeType::normal("tenant");
/// assert_eq!(tenant.to_string(), "@tenant");
/// ```
#[derive(Debug, Clone)]
pub struct ScopeType {
    name: Arc<str>,
    normal: bool,
}

impl ScopeType {
    /// Declare a normal scope.
    pub fn normal(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            normal: true,
        }
    }

    /// Declare a pseudo scope.
    pub fn pseudo(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            normal: false,
        }
    }

    /// The narrowest scope: a new instance for every injection, never shared.
    pub fn dependent() -> Self {
        Self::pseudo("dependent")
    }

    /// One shared instance, handed out without a proxy.
    pub fn singleton() -> Self {
        Self::pseudo("singleton")
    }

    pub fn application() -> Self {
        Self::normal("application")
    }

    pub fn request() -> Self {
        Self::normal("request")
    }

    pub fn session() -> Self {
        Self::normal("session")
    }

    pub fn conversation() -> Self {
        Self::normal("conversation")
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_normal(&self) -> bool {
        self.normal
    }

    #[inline]
    pub fn is_dependent(&self) -> bool {
        !self.normal && &*self.name == "dependent"
    }
}

impl Default for ScopeType {
    fn default() -> Self {
        Self::dependent()
    }
}

impl PartialEq for ScopeType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ScopeType {}

impl std::hash::Hash for ScopeType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scopes() {
        assert!(ScopeType::dependent().is_dependent());
        assert!(!ScopeType::singleton().is_dependent());
        assert!(!ScopeType::singleton().is_normal());
        assert!(ScopeType::application().is_normal());
        assert!(ScopeType::conversation().is_normal());
    }

    #[test]
    fn test_equality_by_name() {
        assert_eq!(ScopeType::normal("request"), ScopeType::request());
        assert_ne!(ScopeType::request(), ScopeType::session());
    }

    #[test]
    fn test_default_is_dependent() {
        assert!(ScopeType::default().is_dependent());
    }
}
