//! Qualifiers
//!
//! A qualifier narrows a type-based request: among all beans of type `Fish`,
//! only those carrying `@Chunky` match a request for `@Chunky Fish`. A
//! [`QualifierType`] declares the annotation (and which of its members are
//! non-binding); a [`Qualifier`] is one concrete use of it with member values.

use crate::{DiError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Name of the implicit qualifier of beans and requests with none declared.
pub const DEFAULT_QUALIFIER: &str = "Default";

/// Name of the qualifier every bean carries.
pub const ANY_QUALIFIER: &str = "Any";

/// Value of a qualifier member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QualifierValue {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

impl fmt::Display for QualifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<bool> for QualifierValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QualifierValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for QualifierValue {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for QualifierValue {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

/// Declaration of a qualifier annotation.
///
/// Two qualifier types are the same type when their names are equal.
#[derive(Debug, Clone)]
pub struct QualifierType {
    name: Arc<str>,
    nonbinding: BTreeSet<Arc<str>>,
}

impl QualifierType {
    /// Declare a qualifier type with only binding members.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            nonbinding: BTreeSet::new(),
        }
    }

    /// Mark a member as non-binding: its value never affects matching.
    pub fn nonbinding(mut self, member: impl Into<Arc<str>>) -> Self {
        self.nonbinding.insert(member.into());
        self
    }

    /// The built-in `Default` qualifier type.
    pub fn default_type() -> Self {
        Self::new(DEFAULT_QUALIFIER)
    }

    /// The built-in `Any` qualifier type.
    pub fn any_type() -> Self {
        Self::new(ANY_QUALIFIER)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `member` takes part in qualifier equality.
    #[inline]
    pub fn is_binding(&self, member: &str) -> bool {
        !self.nonbinding.contains(member)
    }

    /// Create an instance of this qualifier with no member values.
    pub fn instance(self) -> Qualifier {
        Qualifier {
            ty: Arc::new(self),
            members: BTreeMap::new(),
        }
    }
}

impl PartialEq for QualifierType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for QualifierType {}

impl Hash for QualifierType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A concrete qualifier: a qualifier type plus member values.
///
/// Equality is "same qualifier type and equal values for every binding
/// member". Values of non-binding members are ignored.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::QualifierType;
///
/// let chunky = QualifierType::new("Chunky").nonbinding("note");
///
/// let a = chunky.clone().instance().with("real", true).with("note", "a");
/// let b = chunky.clone().instance().with("real", true).with("note", "b");
/// let c = chunky.instance().with("real", false);
///
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
#[derive(Debug, Clone)]
pub struct Qualifier {
    ty: Arc<QualifierType>,
    members: BTreeMap<Arc<str>, QualifierValue>,
}

impl Qualifier {
    /// Shorthand for a member-less qualifier of a fresh type named `name`.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        QualifierType::new(name).instance()
    }

    /// The implicit `Default` qualifier.
    pub fn default_qualifier() -> Self {
        QualifierType::default_type().instance()
    }

    /// The `Any` qualifier.
    pub fn any() -> Self {
        QualifierType::any_type().instance()
    }

    /// Set a member value.
    pub fn with(mut self, member: impl Into<Arc<str>>, value: impl Into<QualifierValue>) -> Self {
        self.members.insert(member.into(), value.into());
        self
    }

    #[inline]
    pub fn qualifier_type(&self) -> &QualifierType {
        &self.ty
    }

    /// Name of the qualifier type.
    #[inline]
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    /// Look up a member value.
    pub fn member(&self, member: &str) -> Option<&QualifierValue> {
        self.members.get(member)
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        self.type_name() == DEFAULT_QUALIFIER
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        self.type_name() == ANY_QUALIFIER
    }

    fn binding_members(&self) -> impl Iterator<Item = (&Arc<str>, &QualifierValue)> {
        self.members
            .iter()
            .filter(|(member, _)| self.ty.is_binding(member))
    }
}

impl PartialEq for Qualifier {
    fn eq(&self, other: &Self) -> bool {
        if self.ty != other.ty {
            return false;
        }
        // A member missing on one side only matches if it is non-binding there.
        let ours = self
            .binding_members()
            .filter(|(member, _)| other.ty.is_binding(member));
        let theirs = other
            .binding_members()
            .filter(|(member, _)| self.ty.is_binding(member));
        ours.eq(theirs)
    }
}

impl Eq for Qualifier {}

impl Hash for Qualifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Member values are left out so that hashing stays consistent with
        // equality whatever the non-binding declarations are.
        self.ty.hash(state);
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.ty.name())?;
        if !self.members.is_empty() {
            write!(f, "(")?;
            for (i, (member, value)) in self.members.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{member}={value}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Render a qualifier list for diagnostics.
pub(crate) fn describe(qualifiers: &[Qualifier]) -> String {
    if qualifiers.is_empty() {
        return String::from("{}");
    }
    let parts: Vec<String> = qualifiers.iter().map(ToString::to_string).collect();
    format!("{{{}}}", parts.join(", "))
}

/// Reject requests that name the same qualifier type twice.
pub(crate) fn ensure_no_duplicates(qualifiers: &[Qualifier], request: &dyn fmt::Display) -> Result<()> {
    for (i, qualifier) in qualifiers.iter().enumerate() {
        if qualifiers[..i]
            .iter()
            .any(|earlier| earlier.qualifier_type() == qualifier.qualifier_type())
        {
            return Err(DiError::DuplicateQualifier {
                qualifier: qualifier.type_name().to_string(),
                request: request.to_string(),
            });
        }
    }
    Ok(())
}

/// Request qualifiers in canonical form: sorted by type name, with the
/// implicit `Default` qualifier when none are given.
pub(crate) fn normalize_request(qualifiers: &[Qualifier]) -> Vec<Qualifier> {
    if qualifiers.is_empty() {
        return vec![Qualifier::default_qualifier()];
    }
    let mut sorted = qualifiers.to_vec();
    sorted.sort_by(|a, b| a.type_name().cmp(b.type_name()));
    sorted
}

/// Qualifiers of a bean in canonical form: `Default` when none are declared,
/// plus `Any` always.
pub(crate) fn normalize_bean(qualifiers: Vec<Qualifier>) -> Vec<Qualifier> {
    let mut qualifiers = qualifiers;
    if qualifiers.iter().all(Qualifier::is_any) {
        qualifiers.push(Qualifier::default_qualifier());
    }
    if !qualifiers.iter().any(Qualifier::is_any) {
        qualifiers.push(Qualifier::any());
    }
    qualifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_member_values_must_match() {
        let ty = QualifierType::new("Chunky");
        let real = ty.clone().instance().with("realChunky", true);
        let fake = ty.instance().with("realChunky", false);
        assert_ne!(real, fake);
    }

    #[test]
    fn test_nonbinding_member_values_ignored() {
        let ty = QualifierType::new("Whitefish").nonbinding("comment");
        let a = ty.clone().instance().with("comment", "caught today");
        let b = ty.instance().with("comment", "frozen");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_types_never_equal() {
        assert_ne!(Qualifier::named("Tame"), Qualifier::named("Wild"));
        assert_eq!(Qualifier::named("Tame"), Qualifier::named("Tame"));
    }

    #[test]
    fn test_duplicate_types_rejected() {
        let request = "Fish";
        let qualifiers = vec![
            Qualifier::named("Chunky").with("realChunky", true),
            Qualifier::named("Whitefish"),
            Qualifier::named("Chunky").with("realChunky", false),
        ];
        let err = ensure_no_duplicates(&qualifiers, &request).unwrap_err();
        assert!(matches!(err, DiError::DuplicateQualifier { qualifier, .. } if qualifier == "Chunky"));
    }

    #[test]
    fn test_bean_defaults() {
        let plain = normalize_bean(Vec::new());
        assert!(plain.iter().any(Qualifier::is_default));
        assert!(plain.iter().any(Qualifier::is_any));

        let qualified = normalize_bean(vec![Qualifier::named("Tame")]);
        assert!(!qualified.iter().any(Qualifier::is_default));
        assert!(qualified.iter().any(Qualifier::is_any));
    }

    #[test]
    fn test_request_defaults_and_order() {
        assert_eq!(normalize_request(&[]), vec![Qualifier::default_qualifier()]);

        let normalized = normalize_request(&[Qualifier::named("Wild"), Qualifier::named("Big")]);
        assert_eq!(normalized[0].type_name(), "Big");
        assert_eq!(normalized[1].type_name(), "Wild");
    }

    #[test]
    fn test_display() {
        let q = Qualifier::named("Chunky").with("realChunky", true);
        assert_eq!(q.to_string(), "@Chunky(realChunky=true)");
        assert_eq!(describe(&[]), "{}");
    }
}
