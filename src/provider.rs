//! Injectable values
//!
//! Contextual instances are stored type-erased as [`Instance`]. The
//! [`Injectable`] marker describes the Rust types that can be turned into one.

use crate::{DiError, Result};
use std::any::Any;
use std::sync::Arc;

/// A type-erased contextual instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Marker trait for types that can be created and held by contexts.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::Injectable;
///
/// struct Cod {
///     weight: u32,
/// }
///
/// fn takes_injectable<T: Injectable>() -> &'static str {
///     T::type_name_of()
/// }
///
/// assert!(takes_injectable::<Cod>().ends_with("Cod"));
/// ```
pub trait Injectable: Send + Sync + 'static {
    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }

    /// Erase into an [`Instance`].
    #[inline]
    fn into_instance(self) -> Instance
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// Downcast an instance of `bean` to `T`.
pub(crate) fn downcast<T: Injectable>(instance: Instance, bean: &str) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        bean: bean.to_string(),
        expected: std::any::type_name::<T>(),
    })
}
