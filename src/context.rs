//! Contexts
//!
//! A context holds the instances of one scope for the duration of one
//! activation. Several contexts may be registered for a scope, but at most
//! one of them may be active at any instant.
//!
//! # Provided contexts
//!
//! - [`ScopedContext`] - one shared store, explicitly activated and
//!   deactivated (application, singleton, custom shared scopes)
//! - [`ThreadBoundContext`] - one store per thread that activated it
//!   (request-style scopes)
//! - [`DependentContext`] - always active, never caches

use crate::creational::{create_instance, CreationalContext};
use crate::store::{destroy_contextual, destroy_dependents, DependentInstance, InstanceStore};
use crate::{BeanDefinition, DiError, Instance, Result, ScopeType};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

#[cfg(feature = "logging")]
use tracing::debug;

/// Holds the contextual instances of one scope.
pub trait Context: Send + Sync {
    /// The scope this context serves.
    fn scope(&self) -> &ScopeType;

    /// Whether the context is active for the caller right now.
    fn is_active(&self) -> bool;

    /// Return the instance of `bean`.
    ///
    /// With a creational context the instance is created when absent; without
    /// one, `Ok(None)` means no instance exists yet. Fails when the context is
    /// not active.
    fn get(
        &self,
        bean: &Arc<BeanDefinition>,
        creational: Option<&mut CreationalContext<'_>>,
    ) -> Result<Option<Instance>>;

    /// Destroy the instance of `bean`, if one exists. Returns whether one did.
    fn destroy_instance(&self, bean: &BeanDefinition) -> Result<bool>;

    /// Destroy every instance held by the current activation.
    ///
    /// Destruction failures never stop the teardown; they are returned.
    fn destroy(&self) -> Vec<DiError>;
}

fn not_active(scope: &ScopeType) -> DiError {
    DiError::ContextNotActive {
        scope: scope.to_string(),
    }
}

/// Create a shareable instance; a missing product is illegal outside the
/// dependent scope.
fn create_shared(
    bean: &Arc<BeanDefinition>,
    creational: &CreationalContext<'_>,
    scope: &ScopeType,
) -> Result<(Instance, Vec<DependentInstance>)> {
    let (product, dependents) = create_instance(bean, creational)?;
    match product {
        Some(instance) => Ok((instance, dependents)),
        None => {
            let mut failures = Vec::new();
            destroy_dependents(dependents, &mut failures);
            Err(DiError::IllegalProduct {
                bean: bean.to_string(),
                scope: scope.to_string(),
                cleanup_failures: failures,
            })
        }
    }
}

fn get_from_store(
    store: &InstanceStore,
    scope: &ScopeType,
    bean: &Arc<BeanDefinition>,
    creational: Option<&mut CreationalContext<'_>>,
) -> Result<Option<Instance>> {
    if let Some(existing) = store.get(bean.id()) {
        return Ok(Some(existing));
    }
    let Some(creational) = creational else {
        return Ok(None);
    };
    // Checked before entering the slot: re-entering it would block forever.
    creational.ensure_not_creating(bean)?;
    store
        .get_or_try_create(bean, || create_shared(bean, creational, scope))
        .map(Some)
}

fn destroy_in_store(store: &InstanceStore, bean: &BeanDefinition) -> Result<bool> {
    let Some(contextual) = store.remove(bean.id()) else {
        return Ok(false);
    };
    match destroy_contextual(contextual).into_iter().next() {
        Some(failure) => Err(failure),
        None => Ok(true),
    }
}

// =============================================================================
// Scoped Context
// =============================================================================

/// A context with one store shared by every thread.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::{Context, ScopeType, ScopedContext};
///
/// let context = ScopedContext::new(ScopeType::session());
/// assert!(!context.is_active());
///
/// context.activate();
/// assert!(context.is_active());
///
/// let failures = context.deactivate();
/// assert!(failures.is_empty());
/// ```
pub struct ScopedContext {
    scope: ScopeType,
    active: AtomicBool,
    store: InstanceStore,
}

impl ScopedContext {
    /// Create an inactive context.
    pub fn new(scope: ScopeType) -> Self {
        Self {
            scope,
            active: AtomicBool::new(false),
            store: InstanceStore::new(),
        }
    }

    /// Create an already active context.
    pub fn active(scope: ScopeType) -> Self {
        let context = Self::new(scope);
        context.activate();
        context
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(target: "contextual_beans", scope = %self.scope, "Context activated");
    }

    /// End the activation: destroy every instance, then become inactive.
    pub fn deactivate(&self) -> Vec<DiError> {
        let failures = self.store.destroy_all();
        self.active.store(false, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            scope = %self.scope,
            failures = failures.len(),
            "Context deactivated"
        );

        failures
    }

    /// Number of instances currently held.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Context for ScopedContext {
    fn scope(&self) -> &ScopeType {
        &self.scope
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn get(
        &self,
        bean: &Arc<BeanDefinition>,
        creational: Option<&mut CreationalContext<'_>>,
    ) -> Result<Option<Instance>> {
        if !self.is_active() {
            return Err(not_active(&self.scope));
        }
        get_from_store(&self.store, &self.scope, bean, creational)
    }

    fn destroy_instance(&self, bean: &BeanDefinition) -> Result<bool> {
        if !self.is_active() {
            return Err(not_active(&self.scope));
        }
        destroy_in_store(&self.store, bean)
    }

    fn destroy(&self) -> Vec<DiError> {
        let failures = self.store.destroy_all();

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            scope = %self.scope,
            failures = failures.len(),
            "Context destroyed"
        );

        failures
    }
}

impl std::fmt::Debug for ScopedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedContext")
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .field("instances", &self.store.len())
            .finish()
    }
}

// =============================================================================
// Thread-Bound Context
// =============================================================================

/// A context activated per thread, one store per activation.
///
/// Each thread that calls [`activate`](Self::activate) gets its own store;
/// the context reports itself active only on those threads.
pub struct ThreadBoundContext {
    scope: ScopeType,
    stores: DashMap<ThreadId, Arc<InstanceStore>, RandomState>,
}

impl ThreadBoundContext {
    pub fn new(scope: ScopeType) -> Self {
        Self {
            scope,
            stores: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Begin an activation on the calling thread. Already active is a no-op.
    pub fn activate(&self) {
        self.stores
            .entry(thread::current().id())
            .or_insert_with(|| Arc::new(InstanceStore::new()));

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            scope = %self.scope,
            thread = ?thread::current().id(),
            "Context activated on thread"
        );
    }

    /// End the calling thread's activation, destroying its instances.
    pub fn deactivate(&self) -> Vec<DiError> {
        let Some((_, store)) = self.stores.remove(&thread::current().id()) else {
            return Vec::new();
        };
        let failures = store.destroy_all();

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            scope = %self.scope,
            failures = failures.len(),
            "Context deactivated on thread"
        );

        failures
    }

    /// Number of threads with an activation.
    pub fn activations(&self) -> usize {
        self.stores.len()
    }

    fn current_store(&self) -> Option<Arc<InstanceStore>> {
        self.stores
            .get(&thread::current().id())
            .map(|store| Arc::clone(store.value()))
    }
}

impl Context for ThreadBoundContext {
    fn scope(&self) -> &ScopeType {
        &self.scope
    }

    fn is_active(&self) -> bool {
        self.stores.contains_key(&thread::current().id())
    }

    fn get(
        &self,
        bean: &Arc<BeanDefinition>,
        creational: Option<&mut CreationalContext<'_>>,
    ) -> Result<Option<Instance>> {
        let store = self.current_store().ok_or_else(|| not_active(&self.scope))?;
        get_from_store(&store, &self.scope, bean, creational)
    }

    fn destroy_instance(&self, bean: &BeanDefinition) -> Result<bool> {
        let store = self.current_store().ok_or_else(|| not_active(&self.scope))?;
        destroy_in_store(&store, bean)
    }

    fn destroy(&self) -> Vec<DiError> {
        match self.current_store() {
            Some(store) => store.destroy_all(),
            None => Vec::new(),
        }
    }
}

impl std::fmt::Debug for ThreadBoundContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadBoundContext")
            .field("scope", &self.scope)
            .field("activations", &self.stores.len())
            .finish()
    }
}

// =============================================================================
// Dependent Context
// =============================================================================

/// The context of the dependent pseudo scope.
///
/// Always active. Every request creates a new instance, which is recorded as
/// a dependent of the bean being created and destroyed together with it.
/// A producer yielding nothing is legal here.
#[derive(Debug)]
pub struct DependentContext {
    scope: ScopeType,
}

impl DependentContext {
    pub fn new() -> Self {
        Self {
            scope: ScopeType::dependent(),
        }
    }
}

impl Default for DependentContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for DependentContext {
    fn scope(&self) -> &ScopeType {
        &self.scope
    }

    fn is_active(&self) -> bool {
        true
    }

    fn get(
        &self,
        bean: &Arc<BeanDefinition>,
        creational: Option<&mut CreationalContext<'_>>,
    ) -> Result<Option<Instance>> {
        let Some(creational) = creational else {
            return Ok(None);
        };
        let (product, dependents) = create_instance(bean, creational)?;
        match product {
            Some(instance) => {
                creational.add_dependent(DependentInstance::new(
                    Arc::clone(bean),
                    Arc::clone(&instance),
                    dependents,
                ));
                Ok(Some(instance))
            }
            None => {
                // A null dependent product is legal; cleanup failures are
                // only logged.
                let mut failures = Vec::new();
                destroy_dependents(dependents, &mut failures);
                Ok(None)
            }
        }
    }

    fn destroy_instance(&self, _bean: &BeanDefinition) -> Result<bool> {
        Ok(false)
    }

    fn destroy(&self) -> Vec<DiError> {
        Vec::new()
    }
}

// =============================================================================
// Context Registry
// =============================================================================

/// Maps scope types to their registered contexts.
pub struct ContextRegistry {
    contexts: DashMap<ScopeType, Vec<Arc<dyn Context>>, RandomState>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            contexts: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    pub fn add(&self, context: Arc<dyn Context>) {
        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            scope = %context.scope(),
            "Registered context"
        );

        self.contexts
            .entry(context.scope().clone())
            .or_default()
            .push(context);
    }

    /// The single active context for `scope`.
    ///
    /// Fails when none or more than one reports itself active.
    pub fn get_active(&self, scope: &ScopeType) -> Result<Arc<dyn Context>> {
        let mut active: Vec<Arc<dyn Context>> = self
            .for_scope(scope)
            .into_iter()
            .filter(|context| context.is_active())
            .collect();

        match active.len() {
            0 => Err(not_active(scope)),
            1 => Ok(active.remove(0)),
            count => Err(DiError::MultipleActiveContexts {
                scope: scope.to_string(),
                count,
            }),
        }
    }

    /// Every context registered for `scope`, active or not.
    pub fn for_scope(&self, scope: &ScopeType) -> Vec<Arc<dyn Context>> {
        self.contexts
            .get(scope)
            .map(|contexts| contexts.value().clone())
            .unwrap_or_default()
    }

    /// Every registered context.
    pub fn all(&self) -> Vec<Arc<dyn Context>> {
        self.contexts
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("scopes", &self.contexts.len())
            .finish()
    }
}
