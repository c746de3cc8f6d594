//! Contextual instance storage
//!
//! One [`InstanceStore`] backs one context activation. Lookups are lock-free
//! reads on a `DashMap`; creation goes through a per-bean `OnceCell`, so
//! concurrent first access to the same bean constructs exactly one instance.
//! A process-wide wait graph turns creations that would block on each other
//! across threads into a circular dependency error.

use crate::{BeanDefinition, BeanId, DiError, Instance, Result};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

// =============================================================================
// Wait Graph
// =============================================================================

/// Identity of a creation slot: the address of its cell.
type SlotKey = usize;

/// Which thread builds each creation slot, and which slot each thread is
/// blocked on. Shared by every store, so a cycle of waits spanning several
/// contexts is seen as well.
#[derive(Default)]
struct WaitGraph {
    builders: HashMap<SlotKey, (ThreadId, Arc<BeanDefinition>), RandomState>,
    waiting: HashMap<ThreadId, (SlotKey, Arc<BeanDefinition>), RandomState>,
}

static WAIT_GRAPH: Lazy<Mutex<WaitGraph>> = Lazy::new(|| Mutex::new(WaitGraph::default()));

fn wait_graph() -> MutexGuard<'static, WaitGraph> {
    WAIT_GRAPH.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WaitGraph {
    /// Record that `thread` is about to wait on `slot`.
    ///
    /// Fails when the builder of `slot` is, through a chain of waits, itself
    /// waiting on a slot built by `thread`: blocking would never end.
    fn enter_wait(
        &mut self,
        thread: ThreadId,
        slot: SlotKey,
        bean: &Arc<BeanDefinition>,
    ) -> Result<()> {
        let mut path = vec![bean.to_string()];
        let mut current = slot;
        // Every hop moves to another builder thread.
        for _ in 0..=self.builders.len() {
            let Some((builder, _)) = self.builders.get(&current) else {
                break;
            };
            if *builder == thread {
                if let Some(closing) = path.last().cloned() {
                    path.insert(0, closing);
                }

                #[cfg(feature = "logging")]
                debug!(
                    target: "contextual_beans",
                    bean = %bean,
                    path = ?path,
                    "Construction wait cycle across threads"
                );

                return Err(DiError::CircularDependency {
                    bean: bean.to_string(),
                    path,
                });
            }
            let Some((next, next_bean)) = self.waiting.get(builder) else {
                break;
            };
            current = *next;
            path.push(next_bean.to_string());
        }

        self.waiting.insert(thread, (slot, Arc::clone(bean)));
        Ok(())
    }
}

/// Clears a thread's wait edge once it stops waiting.
struct WaitEdge {
    thread: ThreadId,
    slot: SlotKey,
}

impl Drop for WaitEdge {
    fn drop(&mut self) {
        let mut graph = wait_graph();
        if graph
            .waiting
            .get(&self.thread)
            .is_some_and(|(slot, _)| *slot == self.slot)
        {
            graph.waiting.remove(&self.thread);
        }
    }
}

/// Marks a thread as the builder of a slot for as long as it lives.
struct BuildClaim {
    slot: SlotKey,
}

impl BuildClaim {
    fn enter(thread: ThreadId, slot: SlotKey, bean: &Arc<BeanDefinition>) -> Self {
        let mut graph = wait_graph();
        graph.waiting.remove(&thread);
        graph.builders.insert(slot, (thread, Arc::clone(bean)));
        Self { slot }
    }
}

impl Drop for BuildClaim {
    fn drop(&mut self) {
        wait_graph().builders.remove(&self.slot);
    }
}

// =============================================================================
// Instances
// =============================================================================

/// An instance created while building another one, destroyed together with it.
#[derive(Clone)]
pub struct DependentInstance {
    bean: Arc<BeanDefinition>,
    instance: Instance,
    dependents: Vec<DependentInstance>,
}

impl DependentInstance {
    pub(crate) fn new(
        bean: Arc<BeanDefinition>,
        instance: Instance,
        dependents: Vec<DependentInstance>,
    ) -> Self {
        Self {
            bean,
            instance,
            dependents,
        }
    }

    #[inline]
    pub fn bean(&self) -> &Arc<BeanDefinition> {
        &self.bean
    }
}

/// An instance held by a context, with the dependents created for it.
#[derive(Clone)]
pub struct ContextualInstance {
    bean: Arc<BeanDefinition>,
    instance: Instance,
    dependents: Vec<DependentInstance>,
    /// Creation order within the store
    sequence: u64,
}

impl ContextualInstance {
    #[inline]
    pub fn bean(&self) -> &Arc<BeanDefinition> {
        &self.bean
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn dependents(&self) -> &[DependentInstance] {
        &self.dependents
    }
}

/// Map from bean identity to a lazily created instance.
pub struct InstanceStore {
    instances: DashMap<BeanId, Arc<OnceCell<ContextualInstance>>, RandomState>,
    sequence: AtomicU64,
}

impl InstanceStore {
    #[inline]
    pub fn new() -> Self {
        Self {
            instances: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            sequence: AtomicU64::new(0),
        }
    }

    /// The existing instance of `id`, if one was created.
    #[inline]
    pub fn get(&self, id: BeanId) -> Option<Instance> {
        self.instances
            .get(&id)
            .and_then(|cell| cell.get().map(|ci| Arc::clone(&ci.instance)))
    }

    #[inline]
    pub fn contains(&self, id: BeanId) -> bool {
        self.get(id).is_some()
    }

    /// Return the instance of `bean`, creating it with `create` if absent.
    ///
    /// Only one caller runs `create` per bean; the others block until it
    /// finishes and observe its result. A failed creation leaves the slot
    /// empty for the next caller.
    ///
    /// Fails with a circular dependency instead of blocking when the thread
    /// creating the slot is, directly or through other threads, waiting on a
    /// creation the caller is running.
    pub fn get_or_try_create<F>(&self, bean: &Arc<BeanDefinition>, create: F) -> Result<Instance>
    where
        F: FnOnce() -> Result<(Instance, Vec<DependentInstance>)>,
    {
        // Clone the cell out so no shard lock is held while constructing.
        let cell = Arc::clone(
            self.instances
                .entry(bean.id())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );
        if let Some(contextual) = cell.get() {
            return Ok(Arc::clone(&contextual.instance));
        }

        let slot = Arc::as_ptr(&cell) as SlotKey;
        let thread = thread::current().id();
        wait_graph().enter_wait(thread, slot, bean)?;
        let _edge = WaitEdge { thread, slot };

        let contextual = cell.get_or_try_init(|| {
            let _claim = BuildClaim::enter(thread, slot, bean);
            let (instance, dependents) = create()?;

            #[cfg(feature = "logging")]
            debug!(
                target: "contextual_beans",
                bean = %bean,
                dependents = dependents.len(),
                "Created contextual instance"
            );

            Ok::<_, DiError>(ContextualInstance {
                bean: Arc::clone(bean),
                instance,
                dependents,
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            })
        })?;
        Ok(Arc::clone(&contextual.instance))
    }

    /// Remove the instance of `id` without destroying it.
    pub fn remove(&self, id: BeanId) -> Option<ContextualInstance> {
        let (_, cell) = self.instances.remove(&id)?;
        cell.get().cloned()
    }

    /// Remove every instance, latest created first.
    pub fn drain(&self) -> Vec<ContextualInstance> {
        let ids: Vec<BeanId> = self.instances.iter().map(|entry| *entry.key()).collect();
        let mut drained: Vec<_> = ids.into_iter().filter_map(|id| self.remove(id)).collect();
        drained.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        drained
    }

    /// Destroy every instance, continuing past failures.
    ///
    /// Returns the failures that were swallowed.
    pub fn destroy_all(&self) -> Vec<DiError> {
        let mut failures = Vec::new();
        for contextual in self.drain() {
            failures.extend(destroy_contextual(contextual));
        }
        failures
    }

    /// Number of created instances.
    pub fn len(&self) -> usize {
        self.instances
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InstanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceStore")
            .field("count", &self.len())
            .finish()
    }
}

/// Destroy one contextual instance and then its dependents.
///
/// Every failure is collected and logged; none stops the rest.
pub(crate) fn destroy_contextual(contextual: ContextualInstance) -> Vec<DiError> {
    let mut failures = Vec::new();
    destroy_one(&contextual.bean, contextual.instance, &mut failures);
    destroy_dependents(contextual.dependents, &mut failures);
    failures
}

/// Destroy dependent instances, each before its own dependents.
pub(crate) fn destroy_dependents(dependents: Vec<DependentInstance>, failures: &mut Vec<DiError>) {
    for dependent in dependents.into_iter().rev() {
        destroy_one(&dependent.bean, dependent.instance, failures);
        destroy_dependents(dependent.dependents, failures);
    }
}

fn destroy_one(bean: &Arc<BeanDefinition>, instance: Instance, failures: &mut Vec<DiError>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| bean.destroy(instance)));
    let failure = match outcome {
        Ok(Ok(())) => {
            #[cfg(feature = "logging")]
            debug!(target: "contextual_beans", bean = %bean, "Destroyed contextual instance");
            return;
        }
        Ok(Err(err)) => match err {
            DiError::DestructionFailed { .. } => err,
            other => DiError::destruction_failed(bean.to_string(), other.to_string()),
        },
        Err(payload) => DiError::destruction_failed(bean.to_string(), panic_message(&*payload)),
    };

    #[cfg(feature = "logging")]
    warn!(
        target: "contextual_beans",
        bean = %bean,
        error = %failure,
        "Destruction callback failed, continuing"
    );

    failures.push(failure);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("destruction callback panicked")
    }
}
