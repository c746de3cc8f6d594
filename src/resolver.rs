//! Typesafe resolution
//!
//! Turns a request (required type plus qualifiers) into the set of
//! highest-precedence beans that satisfy it, and memoizes the outcome per
//! request shape. Cached sets are only valid for one bean universe, so the
//! cache is dropped whenever the registry generation moves.

use crate::qualifier::{self, Qualifier};
use crate::{matcher, BeanDefinition, DiError, Precedence, Registry, Result, TypeDescriptor};
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Shared, immutable candidate set.
pub type Candidates = Arc<[Arc<BeanDefinition>]>;

/// Canonical request shape used as cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolutionKey {
    ty: TypeDescriptor,
    qualifiers: Vec<Qualifier>,
}

/// A resolution request, rendered in diagnostics as `{@Chunky} Fish`.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub ty: &'a TypeDescriptor,
    pub qualifiers: &'a [Qualifier],
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.qualifiers.is_empty() {
            write!(f, "{} ", qualifier::describe(self.qualifiers))?;
        }
        write!(f, "{}", self.ty)
    }
}

/// Memoizing resolver.
pub struct Resolver {
    by_type: DashMap<ResolutionKey, Candidates, RandomState>,
    by_name: DashMap<Arc<str>, Candidates, RandomState>,
    /// Registry generation the cached entries were computed against
    generation: AtomicU64,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            by_type: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            by_name: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            generation: AtomicU64::new(0),
        }
    }

    /// Drop every memoized result.
    pub fn clear(&self) {
        self.by_type.clear();
        self.by_name.clear();

        #[cfg(feature = "logging")]
        debug!(target: "contextual_beans", "Resolution cache cleared");
    }

    /// Number of memoized type-based requests.
    pub fn cached(&self) -> usize {
        self.by_type.len()
    }

    fn sync_generation(&self, registry: &Registry) {
        let current = registry.generation();
        if self.generation.swap(current, Ordering::AcqRel) != current {
            self.clear();
        }
    }

    /// Reject malformed requests before any matching happens.
    pub fn validate_request(
        registry: &Registry,
        ty: &TypeDescriptor,
        qualifiers: &[Qualifier],
        request: &dyn fmt::Display,
    ) -> Result<()> {
        qualifier::ensure_no_duplicates(qualifiers, request)?;
        ty.ensure_concrete()?;
        if let Some(unknown) = qualifiers
            .iter()
            .find(|q| !registry.is_qualifier(q.type_name()))
        {
            return Err(DiError::NotAQualifier {
                annotation: unknown.to_string(),
            });
        }
        Ok(())
    }

    /// Every highest-precedence bean satisfying the request.
    ///
    /// Beans of disabled deployment types never take part, and a bean with a
    /// registered specializer is masked by it. The set may hold more than one
    /// bean; deciding that this is ambiguous is left to [`resolve`](Self::resolve).
    pub fn resolve_all(
        &self,
        registry: &Registry,
        precedence: &Precedence,
        ty: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> Result<Candidates> {
        let request = Request { ty, qualifiers };
        Self::validate_request(registry, ty, qualifiers, &request)?;
        self.sync_generation(registry);

        let key = ResolutionKey {
            ty: ty.clone(),
            qualifiers: qualifier::normalize_request(qualifiers),
        };
        if let Some(hit) = self.by_type.get(&key) {
            #[cfg(feature = "logging")]
            trace!(target: "contextual_beans", request = %request, "Resolution cache hit");
            return Ok(Arc::clone(hit.value()));
        }

        let matching: Vec<_> = registry
            .candidates_for_type(ty)
            .into_iter()
            .filter(|bean| precedence.is_enabled(bean.deployment_type()))
            .filter(|bean| matcher::matches(bean, ty, &key.qualifiers))
            .collect();
        let candidates: Candidates = precedence
            .retain_highest(mask_specialized(registry, precedence, matching))
            .into();

        #[cfg(feature = "logging")]
        trace!(
            target: "contextual_beans",
            request = %request,
            candidates = candidates.len(),
            "Resolution cache miss"
        );

        self.by_type.insert(key, Arc::clone(&candidates));
        Ok(candidates)
    }

    /// Resolve the request to exactly one bean.
    ///
    /// `injection_point` only feeds diagnostics.
    pub fn resolve(
        &self,
        registry: &Registry,
        precedence: &Precedence,
        ty: &TypeDescriptor,
        qualifiers: &[Qualifier],
        injection_point: Option<&dyn fmt::Display>,
    ) -> Result<Arc<BeanDefinition>> {
        let candidates = self.resolve_all(registry, precedence, ty, qualifiers)?;
        let request = Request { ty, qualifiers };
        let describe = || match injection_point {
            Some(ip) => ip.to_string(),
            None => request.to_string(),
        };

        let bean = match &*candidates {
            [] => return Err(DiError::Unsatisfied { request: describe() }),
            [bean] => Arc::clone(bean),
            many => {
                return Err(DiError::Ambiguous {
                    request: describe(),
                    candidates: many.iter().map(|bean| bean.to_string()).collect(),
                });
            }
        };

        if bean.scope().is_normal() && !bean.is_proxyable() {
            return Err(DiError::Unproxyable {
                bean: bean.to_string(),
                injection_point: injection_point.map(ToString::to_string),
            });
        }
        Ok(bean)
    }

    /// Beans named `name`, with specialized beans masked.
    ///
    /// No precedence arbitration: several visible beans with the same name are
    /// all returned.
    pub fn resolve_by_name(
        &self,
        registry: &Registry,
        precedence: &Precedence,
        name: &str,
    ) -> Candidates {
        self.sync_generation(registry);
        if let Some(hit) = self.by_name.get(name) {
            return Arc::clone(hit.value());
        }

        let named: Vec<_> = registry
            .by_name(name)
            .into_iter()
            .filter(|bean| precedence.is_enabled(bean.deployment_type()))
            .collect();
        let candidates: Candidates = mask_specialized(registry, precedence, named).into();

        self.by_name.insert(Arc::from(name), Arc::clone(&candidates));
        candidates
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("cached_types", &self.by_type.len())
            .field("cached_names", &self.by_name.len())
            .finish()
    }
}

/// Drop every bean that an enabled registered specializer supersedes.
fn mask_specialized(
    registry: &Registry,
    precedence: &Precedence,
    beans: Vec<Arc<BeanDefinition>>,
) -> Vec<Arc<BeanDefinition>> {
    beans
        .into_iter()
        .filter(|bean| {
            registry
                .specializer_of(bean.id())
                .is_none_or(|specializer| !precedence.is_enabled(specializer.deployment_type()))
        })
        .collect()
}
