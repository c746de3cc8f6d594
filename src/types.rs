//! Runtime type descriptors
//!
//! Beans declare the set of API types they can be injected as, and requests
//! name the type they require. Both sides use [`TypeDescriptor`], a small
//! runtime model of a (possibly generic) type. Descriptors are pre-computed
//! by whatever discovers beans; resolution never reflects on Rust types.

use crate::{DiError, Result};
use std::fmt;
use std::sync::Arc;

/// Names treated as primitive types (never null, never proxyable).
const PRIMITIVES: &[&str] = &[
    "bool", "char", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64",
    "u128", "usize", "f32", "f64",
];

/// A runtime description of a type.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::TypeDescriptor;
///
/// let list = TypeDescriptor::generic("List", [TypeDescriptor::class("Fish")]);
/// assert_eq!(list.to_string(), "List<Fish>");
/// assert!(list.is_concrete());
///
/// let wild = TypeDescriptor::generic("List", [TypeDescriptor::wildcard()]);
/// assert!(!wild.is_concrete());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// A class or interface, with its actual type arguments
    Class {
        name: Arc<str>,
        args: Vec<TypeDescriptor>,
    },
    /// `?`
    Wildcard,
    /// An unresolved type parameter such as `T`
    Variable(Arc<str>),
}

impl TypeDescriptor {
    /// A non-generic type.
    #[inline]
    pub fn class(name: impl Into<Arc<str>>) -> Self {
        Self::Class {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// A parameterized type.
    pub fn generic(
        name: impl Into<Arc<str>>,
        args: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        Self::Class {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    /// A wildcard type argument.
    #[inline]
    pub fn wildcard() -> Self {
        Self::Wildcard
    }

    /// A type variable.
    #[inline]
    pub fn variable(name: impl Into<Arc<str>>) -> Self {
        Self::Variable(name.into())
    }

    /// Describe a Rust type by its type name.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::class(std::any::type_name::<T>())
    }

    /// The raw (erased) name, if this is a class.
    pub fn raw_name(&self) -> Option<&str> {
        match self {
            Self::Class { name, .. } => Some(&**name),
            _ => None,
        }
    }

    /// Actual type arguments (empty for raw and non-class types).
    pub fn args(&self) -> &[TypeDescriptor] {
        match self {
            Self::Class { args, .. } => args,
            _ => &[],
        }
    }

    /// True when the type has no wildcard or type variable anywhere in it.
    pub fn is_concrete(&self) -> bool {
        match self {
            Self::Class { args, .. } => args.iter().all(TypeDescriptor::is_concrete),
            Self::Wildcard | Self::Variable(_) => false,
        }
    }

    /// True for the primitive type names.
    pub fn is_primitive(&self) -> bool {
        match self {
            Self::Class { name, args } => args.is_empty() && PRIMITIVES.contains(&&**name),
            _ => false,
        }
    }

    /// Fail fast when the type cannot name a resolution target.
    pub fn ensure_concrete(&self) -> Result<()> {
        fn find_reason(ty: &TypeDescriptor) -> Option<&'static str> {
            match ty {
                TypeDescriptor::Wildcard => Some("parameterized with a wildcard"),
                TypeDescriptor::Variable(_) => Some("parameterized with a type variable"),
                TypeDescriptor::Class { args, .. } => args.iter().find_map(find_reason),
            }
        }

        match find_reason(self) {
            Some(reason) => Err(DiError::NonConcreteType {
                type_name: self.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Whether a bean exposing `candidate` satisfies a requirement for `self`.
    ///
    /// Bean type sets are already closed over supertypes, so this is raw-type
    /// equality plus exact equality of every actual type argument. Type
    /// arguments are invariant: `List<Cod>` never satisfies `List<Fish>`, and a
    /// raw `List` only matches a raw `List`.
    pub fn is_assignable_from(&self, candidate: &TypeDescriptor) -> bool {
        match (self, candidate) {
            (
                Self::Class { name, args },
                Self::Class {
                    name: other_name,
                    args: other_args,
                },
            ) => name == other_name && args == other_args,
            _ => false,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Self::Wildcard => write!(f, "?"),
            Self::Variable(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for TypeDescriptor {
    fn from(name: &str) -> Self {
        Self::class(name)
    }
}
