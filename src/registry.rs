//! Bean registry
//!
//! Holds every registered [`BeanDefinition`], indexed by identity, raw type
//! name and bean name. Registries form a parent chain: a child sees its own
//! beans plus all of its ancestors' beans, never the other way around.

use crate::{BeanDefinition, BeanId, DiError, QualifierType, Result, TypeDescriptor};
use ahash::RandomState;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe bean registry.
///
/// Uses `DashMap` with `ahash` for concurrent reads after deployment.
pub struct Registry {
    beans: DashMap<BeanId, Arc<BeanDefinition>, RandomState>,
    /// Raw type name -> beans exposing a type with that raw name
    by_type: DashMap<Arc<str>, Vec<BeanId>, RandomState>,
    by_name: DashMap<Arc<str>, Vec<BeanId>, RandomState>,
    /// Specialized bean -> its specializer
    specializers: DashMap<BeanId, BeanId, RandomState>,
    qualifier_types: DashSet<Arc<str>, RandomState>,
    /// Bumped on every mutation
    generation: AtomicU64,
    parent: Option<Arc<Registry>>,
}

impl Registry {
    /// Create an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let shard_amount = if capacity <= 16 {
            8
        } else if capacity <= 64 {
            16
        } else {
            32
        };
        let registry = Self {
            beans: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
            by_type: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
            by_name: DashMap::with_hasher_and_shard_amount(RandomState::new(), 8),
            specializers: DashMap::with_hasher_and_shard_amount(RandomState::new(), 8),
            qualifier_types: DashSet::with_hasher(RandomState::new()),
            generation: AtomicU64::new(0),
            parent: None,
        };
        registry.declare_qualifier(&QualifierType::default_type());
        registry.declare_qualifier(&QualifierType::any_type());
        registry
    }

    /// Create a child registry that inherits every bean of this one.
    pub fn child(self: &Arc<Self>) -> Self {
        Self {
            beans: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            by_type: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            by_name: DashMap::with_hasher_and_shard_amount(RandomState::new(), 8),
            specializers: DashMap::with_hasher_and_shard_amount(RandomState::new(), 8),
            qualifier_types: DashSet::with_hasher(RandomState::new()),
            generation: AtomicU64::new(0),
            parent: Some(Arc::clone(self)),
        }
    }

    /// Add a bean.
    ///
    /// Fails when a bean with the same identity is visible from here, or when
    /// the bean specializes a bean that already has a specializer.
    pub fn insert(&self, bean: Arc<BeanDefinition>) -> Result<()> {
        if self.contains(bean.id()) {
            return Err(DiError::AlreadyRegistered {
                bean: bean.to_string(),
            });
        }
        if let Some(target) = bean.specializes() {
            if let Some(existing) = self.specializer_of(target) {
                return Err(DiError::InconsistentSpecialization {
                    bean: bean.to_string(),
                    reason: format!("{target} is already specialized by {existing}"),
                });
            }
            self.specializers.insert(target, bean.id());
        }

        // Several parameterizations of one raw type index the bean once.
        let raw_names: BTreeSet<&str> = bean
            .types()
            .iter()
            .filter_map(TypeDescriptor::raw_name)
            .collect();
        for raw in raw_names {
            self.by_type.entry(Arc::from(raw)).or_default().push(bean.id());
        }
        if let Some(name) = bean.name() {
            self.by_name.entry(Arc::from(name)).or_default().push(bean.id());
        }
        for qualifier in bean.qualifiers() {
            self.declare_qualifier(qualifier.qualifier_type());
        }
        for ip in bean.injection_points() {
            for qualifier in ip.required_qualifiers() {
                self.declare_qualifier(qualifier.qualifier_type());
            }
        }

        self.beans.insert(bean.id(), bean);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Remove a bean registered directly in this registry.
    pub fn remove(&self, id: BeanId) -> Option<Arc<BeanDefinition>> {
        let (_, bean) = self.beans.remove(&id)?;

        for ty in bean.types() {
            if let Some(raw) = ty.raw_name() {
                if let Some(mut ids) = self.by_type.get_mut(raw) {
                    ids.retain(|other| *other != id);
                }
            }
        }
        if let Some(name) = bean.name() {
            if let Some(mut ids) = self.by_name.get_mut(name) {
                ids.retain(|other| *other != id);
            }
        }
        if let Some(target) = bean.specializes() {
            self.specializers.remove_if(&target, |_, specializer| *specializer == id);
        }

        self.generation.fetch_add(1, Ordering::AcqRel);
        Some(bean)
    }

    /// Look up a bean by identity, walking the parent chain.
    pub fn get(&self, id: BeanId) -> Option<Arc<BeanDefinition>> {
        let mut current = Some(self);
        while let Some(registry) = current {
            if let Some(bean) = registry.beans.get(&id) {
                return Some(Arc::clone(bean.value()));
            }
            current = registry.parent.as_deref();
        }
        None
    }

    #[inline]
    pub fn contains(&self, id: BeanId) -> bool {
        self.get(id).is_some()
    }

    /// Every visible bean, in definition order.
    pub fn all(&self) -> Vec<Arc<BeanDefinition>> {
        let mut beans = Vec::with_capacity(self.len());
        let mut current = Some(self);
        while let Some(registry) = current {
            beans.extend(registry.beans.iter().map(|entry| Arc::clone(entry.value())));
            current = registry.parent.as_deref();
        }
        beans.sort_by_key(|bean| bean.id());
        beans
    }

    /// Beans exposing a type with the same raw name as `ty`, in definition
    /// order. Type arguments and qualifiers are left to the matcher.
    pub fn candidates_for_type(&self, ty: &TypeDescriptor) -> Vec<Arc<BeanDefinition>> {
        let Some(raw) = ty.raw_name() else {
            return Vec::new();
        };
        self.collect_indexed(|registry| {
            registry
                .by_type
                .get(raw)
                .map(|ids| ids.value().clone())
                .unwrap_or_default()
        })
    }

    /// Beans declaring `name`, in definition order.
    pub fn by_name(&self, name: &str) -> Vec<Arc<BeanDefinition>> {
        self.collect_indexed(|registry| {
            registry
                .by_name
                .get(name)
                .map(|ids| ids.value().clone())
                .unwrap_or_default()
        })
    }

    fn collect_indexed<F>(&self, ids_in: F) -> Vec<Arc<BeanDefinition>>
    where
        F: Fn(&Registry) -> Vec<BeanId>,
    {
        let mut beans = Vec::new();
        let mut current = Some(self);
        while let Some(registry) = current {
            beans.extend(
                ids_in(registry)
                    .into_iter()
                    .filter_map(|id| registry.beans.get(&id).map(|bean| Arc::clone(bean.value()))),
            );
            current = registry.parent.as_deref();
        }
        beans.sort_by_key(|bean| bean.id());
        beans.dedup_by_key(|bean| bean.id());
        beans
    }

    /// The bean that directly specializes `id`, if one is visible.
    pub fn specializer_of(&self, id: BeanId) -> Option<Arc<BeanDefinition>> {
        let mut current = Some(self);
        while let Some(registry) = current {
            if let Some(specializer) = registry.specializers.get(&id) {
                return self.get(*specializer.value());
            }
            current = registry.parent.as_deref();
        }
        None
    }

    /// Follow specializers from `bean` to the most specialized bean.
    pub fn most_specialized(&self, bean: &Arc<BeanDefinition>) -> Arc<BeanDefinition> {
        let mut current = Arc::clone(bean);
        while let Some(specializer) = self.specializer_of(current.id()) {
            current = specializer;
        }
        current
    }

    /// Make a qualifier type known to resolution.
    pub fn declare_qualifier(&self, qualifier_type: &QualifierType) {
        if !self.is_qualifier(qualifier_type.name()) {
            self.qualifier_types.insert(Arc::from(qualifier_type.name()));
        }
    }

    /// Whether `name` is a declared qualifier type here or in an ancestor.
    pub fn is_qualifier(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(registry) = current {
            if registry.qualifier_types.contains(name) {
                return true;
            }
            current = registry.parent.as_deref();
        }
        false
    }

    /// Mutation counter summed over the parent chain.
    pub fn generation(&self) -> u64 {
        let mut generation = 0;
        let mut current = Some(self);
        while let Some(registry) = current {
            generation += registry.generation.load(Ordering::Acquire);
            current = registry.parent.as_deref();
        }
        generation
    }

    /// Number of visible beans.
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut current = Some(self);
        while let Some(registry) = current {
            len += registry.beans.len();
            current = registry.parent.as_deref();
        }
        len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn parent(&self) -> Option<&Arc<Registry>> {
        self.parent.as_ref()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("count", &self.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Qualifier;

    fn fish(label: &str) -> Arc<BeanDefinition> {
        BeanDefinition::builder(label)
            .with_type("Fish")
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = Registry::new();
        let cod = fish("Cod");
        registry.insert(Arc::clone(&cod)).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get(cod.id()).is_some());
        assert_eq!(registry.candidates_for_type(&"Fish".into()).len(), 1);
        assert!(registry.candidates_for_type(&"Salmon".into()).is_empty());
    }

    #[test]
    fn test_bean_indexed_once_per_raw_type() {
        let registry = Registry::new();
        let dock = BeanDefinition::builder("Dock")
            .with_type(TypeDescriptor::generic("Handler", [TypeDescriptor::class("Cod")]))
            .with_type(TypeDescriptor::generic("Handler", [TypeDescriptor::class("Salmon")]))
            .build()
            .unwrap();
        registry.insert(Arc::clone(&dock)).unwrap();

        let handler = TypeDescriptor::generic("Handler", [TypeDescriptor::class("Cod")]);
        assert_eq!(registry.candidates_for_type(&handler).len(), 1);

        registry.remove(dock.id());
        assert!(registry.candidates_for_type(&handler).is_empty());
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let registry = Registry::new();
        let cod = fish("Cod");
        registry.insert(Arc::clone(&cod)).unwrap();
        assert!(matches!(
            registry.insert(cod),
            Err(DiError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_remove_clears_indexes() {
        let registry = Registry::new();
        let cod = BeanDefinition::builder("Cod")
            .with_type("Fish")
            .name("whitefish")
            .build()
            .unwrap();
        registry.insert(Arc::clone(&cod)).unwrap();
        let before = registry.generation();

        assert!(registry.remove(cod.id()).is_some());
        assert!(registry.candidates_for_type(&"Fish".into()).is_empty());
        assert!(registry.by_name("whitefish").is_empty());
        assert!(registry.generation() > before);
        assert!(registry.remove(cod.id()).is_none());
    }

    #[test]
    fn test_second_specializer_rejected() {
        let registry = Registry::new();
        let cod = fish("Cod");
        let fresh_cod = BeanDefinition::builder("FreshCod")
            .specializes(&cod)
            .build()
            .unwrap();
        let frozen_cod = BeanDefinition::builder("FrozenCod")
            .specializes(&cod)
            .build()
            .unwrap();

        registry.insert(Arc::clone(&cod)).unwrap();
        registry.insert(Arc::clone(&fresh_cod)).unwrap();
        assert!(matches!(
            registry.insert(frozen_cod),
            Err(DiError::InconsistentSpecialization { .. })
        ));
        assert_eq!(
            registry.specializer_of(cod.id()).map(|b| b.id()),
            Some(fresh_cod.id())
        );
    }

    #[test]
    fn test_most_specialized_follows_chain() {
        let registry = Registry::new();
        let cod = fish("Cod");
        let fresh = BeanDefinition::builder("FreshCod")
            .specializes(&cod)
            .build()
            .unwrap();
        let freshest = BeanDefinition::builder("FreshestCod")
            .specializes(&fresh)
            .build()
            .unwrap();
        for bean in [&cod, &fresh, &freshest] {
            registry.insert(Arc::clone(bean)).unwrap();
        }
        assert_eq!(registry.most_specialized(&cod).id(), freshest.id());
    }

    #[test]
    fn test_child_sees_parent_beans() {
        let parent = Arc::new(Registry::new());
        parent.insert(fish("Cod")).unwrap();

        let child = parent.child();
        child.insert(fish("Salmon")).unwrap();

        assert_eq!(child.len(), 2);
        assert_eq!(parent.len(), 1);
        assert_eq!(child.candidates_for_type(&"Fish".into()).len(), 2);
        assert_eq!(parent.candidates_for_type(&"Fish".into()).len(), 1);
    }

    #[test]
    fn test_parent_mutation_changes_child_generation() {
        let parent = Arc::new(Registry::new());
        let child = parent.child();
        let before = child.generation();
        parent.insert(fish("Cod")).unwrap();
        assert!(child.generation() > before);
    }

    #[test]
    fn test_qualifiers_declared_by_beans() {
        let registry = Registry::new();
        assert!(registry.is_qualifier("Default"));
        assert!(!registry.is_qualifier("Tame"));

        let tuna = BeanDefinition::builder("Tuna")
            .qualifier(Qualifier::named("Tame"))
            .build()
            .unwrap();
        registry.insert(tuna).unwrap();
        assert!(registry.is_qualifier("Tame"));
    }

    #[test]
    fn test_all_in_definition_order() {
        let registry = Registry::new();
        let a = fish("A");
        let b = fish("B");
        let c = fish("C");
        registry.insert(Arc::clone(&c)).unwrap();
        registry.insert(Arc::clone(&a)).unwrap();
        registry.insert(Arc::clone(&b)).unwrap();
        let ids: Vec<_> = registry.all().iter().map(|bean| bean.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
    }
}
