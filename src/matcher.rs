//! Type and qualifier matching
//!
//! Decides whether one bean (or observer) satisfies a request. Requests are
//! validated before they get here; matching itself never fails.

use crate::{BeanDefinition, Qualifier, TypeDescriptor};

/// Whether `bean` satisfies a request for `required` with `qualifiers`.
///
/// An empty qualifier list stands for the implicit `Default` qualifier.
#[inline]
pub fn matches(bean: &BeanDefinition, required: &TypeDescriptor, qualifiers: &[Qualifier]) -> bool {
    has_type(bean.types(), required) && has_qualifiers(bean.qualifiers(), qualifiers)
}

/// Whether one of `types` is assignable to `required`.
#[inline]
pub fn has_type(types: &[TypeDescriptor], required: &TypeDescriptor) -> bool {
    types.iter().any(|ty| required.is_assignable_from(ty))
}

/// Whether every required qualifier has an equal declared qualifier.
pub fn has_qualifiers(declared: &[Qualifier], required: &[Qualifier]) -> bool {
    if required.is_empty() {
        return declared.iter().any(Qualifier::is_default);
    }
    required.iter().all(|q| declared.contains(q))
}

/// Observer variant: the observer's qualifiers must all be present on the
/// event. An observer declaring none sees every event of its type.
pub(crate) fn event_has_qualifiers(event: &[Qualifier], observed: &[Qualifier]) -> bool {
    observed
        .iter()
        .all(|q| q.is_any() || event.contains(q))
}
