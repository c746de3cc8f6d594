//! Events and observers
//!
//! Observers register interest in an event type and a set of qualifiers.
//! Firing an event notifies every observer whose type is assignable from one
//! of the event's types and whose qualifiers are all present on the event.
//! There is no ambiguity here: all matching observers are notified, in
//! ascending priority and then registration order.

use crate::qualifier::{self, Qualifier};
use crate::{matcher, BeanDefinition, Injectable, Instance, Result, TypeDescriptor};
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// A fired event: a payload, its type closure and its qualifiers.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::{Event, Qualifier};
///
/// struct Caught {
///     weight: u32,
/// }
///
/// let event = Event::new(Caught { weight: 12 })
///     .with_type("Catch")
///     .qualifier(Qualifier::named("Large"));
///
/// assert_eq!(event.types().len(), 2);
/// assert_eq!(event.payload_as::<Caught>().unwrap().weight, 12);
/// ```
#[derive(Clone)]
pub struct Event {
    payload: Instance,
    types: Vec<TypeDescriptor>,
    qualifiers: Vec<Qualifier>,
}

impl Event {
    /// An event whose only type is the payload's Rust type.
    pub fn new<T: Injectable>(payload: T) -> Self {
        Self {
            payload: payload.into_instance(),
            types: vec![TypeDescriptor::of::<T>()],
            qualifiers: Vec::new(),
        }
    }

    /// An event with an already erased payload and an explicit type.
    pub fn from_instance(payload: Instance, ty: impl Into<TypeDescriptor>) -> Self {
        Self {
            payload,
            types: vec![ty.into()],
            qualifiers: Vec::new(),
        }
    }

    /// Add a type the event is also observable as.
    pub fn with_type(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        let ty = ty.into();
        if !self.types.contains(&ty) {
            self.types.push(ty);
        }
        self
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    #[inline]
    pub fn payload(&self) -> &Instance {
        &self.payload
    }

    pub fn payload_as<T: Injectable>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    #[inline]
    pub fn types(&self) -> &[TypeDescriptor] {
        &self.types
    }

    #[inline]
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("types", &self.types)
            .field("qualifiers", &self.qualifiers)
            .finish()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.qualifiers.is_empty() {
            write!(f, "{} ", qualifier::describe(&self.qualifiers))?;
        }
        match self.types.first() {
            Some(ty) => write!(f, "{ty}"),
            None => write!(f, "<untyped event>"),
        }
    }
}

/// Something that can be notified of events.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &Event) -> Result<()>;
}

impl<F> Observer for F
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    fn notify(&self, event: &Event) -> Result<()> {
        self(event)
    }
}

/// Identity of an observer registration; orders registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// When a bean observer is notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Notify {
    /// Always; the declaring bean's instance is created if needed
    #[default]
    Always,
    /// Only when the declaring bean already has an instance in an active context
    IfExists,
}

/// What an observer observes: a type, qualifiers and a priority.
#[derive(Debug, Clone)]
pub struct ObservedEvent {
    ty: TypeDescriptor,
    qualifiers: Vec<Qualifier>,
    priority: i32,
    label: Option<Arc<str>>,
}

impl ObservedEvent {
    pub fn new(ty: impl Into<TypeDescriptor>) -> Self {
        Self {
            ty: ty.into(),
            qualifiers: Vec::new(),
            priority: 0,
            label: None,
        }
    }

    /// Observe events of a Rust type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeDescriptor::of::<T>())
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// Lower priorities are notified first. Defaults to 0.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Name used in diagnostics.
    pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[inline]
    pub fn observed_type(&self) -> &TypeDescriptor {
        &self.ty
    }

    #[inline]
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }
}

pub(crate) type BeanCallback = Arc<dyn Fn(&Instance, &Event) -> Result<()> + Send + Sync>;

pub(crate) enum ObserverTarget {
    Function(Arc<dyn Observer>),
    Bean {
        bean: Arc<BeanDefinition>,
        notify: Notify,
        callback: BeanCallback,
    },
}

/// A registered observer.
pub struct ObserverRegistration {
    id: ObserverId,
    observed: ObservedEvent,
    target: ObserverTarget,
}

impl ObserverRegistration {
    pub(crate) fn new(observed: ObservedEvent, target: ObserverTarget) -> Self {
        Self {
            id: ObserverId::new(),
            observed,
            target,
        }
    }

    #[inline]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    #[inline]
    pub fn observed_type(&self) -> &TypeDescriptor {
        &self.observed.ty
    }

    #[inline]
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.observed.qualifiers
    }

    #[inline]
    pub fn priority(&self) -> i32 {
        self.observed.priority
    }

    /// The bean declaring this observer, for bean observers.
    pub fn declaring_bean(&self) -> Option<&Arc<BeanDefinition>> {
        match &self.target {
            ObserverTarget::Bean { bean, .. } => Some(bean),
            ObserverTarget::Function(_) => None,
        }
    }

    pub fn notify_mode(&self) -> Notify {
        match &self.target {
            ObserverTarget::Bean { notify, .. } => *notify,
            ObserverTarget::Function(_) => Notify::Always,
        }
    }

    pub(crate) fn target(&self) -> &ObserverTarget {
        &self.target
    }

    fn observes(&self, types: &[TypeDescriptor], qualifiers: &[Qualifier]) -> bool {
        matcher::has_type(types, &self.observed.ty)
            && matcher::event_has_qualifiers(qualifiers, &self.observed.qualifiers)
    }
}

impl fmt::Display for ObserverRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.observed.label, &self.target) {
            (Some(label), _) => write!(f, "{label}"),
            (None, ObserverTarget::Bean { bean, .. }) => {
                write!(f, "observer of {} on {bean}", self.observed.ty)
            }
            (None, ObserverTarget::Function(_)) => {
                write!(f, "observer of {} #{}", self.observed.ty, self.id.0)
            }
        }
    }
}

impl fmt::Debug for ObserverRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistration")
            .field("id", &self.id)
            .field("observed", &self.observed)
            .field("notify", &self.notify_mode())
            .finish()
    }
}

/// Observer registrations, with a parent chain like the bean registry.
pub struct EventBus {
    observers: DashMap<ObserverId, Arc<ObserverRegistration>, RandomState>,
    parent: Option<Arc<EventBus>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            observers: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            parent: None,
        }
    }

    /// A bus that also notifies every observer of this one.
    pub fn child(self: &Arc<Self>) -> Self {
        Self {
            observers: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            parent: Some(Arc::clone(self)),
        }
    }

    pub fn add(&self, registration: ObserverRegistration) -> ObserverId {
        let id = registration.id();

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            observer = %registration,
            priority = registration.priority(),
            "Registered observer"
        );

        self.observers.insert(id, Arc::new(registration));
        id
    }

    /// Remove a registration made on this bus.
    pub fn remove(&self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Every registration observing an event with `types` and `qualifiers`,
    /// ordered by priority then registration.
    ///
    /// The request is expected to be validated already.
    pub fn resolve(
        &self,
        types: &[TypeDescriptor],
        qualifiers: &[Qualifier],
    ) -> Vec<Arc<ObserverRegistration>> {
        let mut matching = Vec::new();
        let mut current = Some(self);
        while let Some(bus) = current {
            matching.extend(
                bus.observers
                    .iter()
                    .filter(|entry| entry.value().observes(types, qualifiers))
                    .map(|entry| Arc::clone(entry.value())),
            );
            current = bus.parent.as_deref();
        }
        matching.sort_by_key(|registration| (registration.priority(), registration.id()));

        #[cfg(feature = "logging")]
        trace!(
            target: "contextual_beans",
            observers = matching.len(),
            "Resolved observers"
        );

        matching
    }

    /// Number of registrations visible from this bus.
    pub fn len(&self) -> usize {
        self.observers.len() + self.parent.as_ref().map_or(0, |parent| parent.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("count", &self.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
