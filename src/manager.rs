//! The bean manager
//!
//! [`BeanManager`] ties the registry, the resolver, the deployment-type
//! precedence, the contexts and the observers together. It is built once and
//! passed explicitly to whoever needs it; cloning it is cheap and every clone
//! shares the same state.

use crate::context::{Context, ContextRegistry, DependentContext, ScopedContext};
use crate::creational::CreationalContext;
use crate::event::{EventBus, ObserverTarget};
use crate::qualifier::{self, Qualifier};
use crate::reference::{ClientProxy, ContextualReference};
use crate::{
    validator, BeanDefinition, BeanId, DiError, Event, Injectable, InjectionPoint, Instance,
    ManagerBuilder, ManagerConfig, Notify, ObservedEvent, Observer, ObserverId,
    ObserverRegistration, Precedence, QualifierType, Registry, Resolver, Result, ScopeType,
    TypeDescriptor,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

pub(crate) struct ManagerInner {
    registry: Arc<Registry>,
    resolver: Resolver,
    precedence: Precedence,
    contexts: Arc<ContextRegistry>,
    observers: Arc<EventBus>,
    locked: AtomicBool,
}

/// Entry point for registration, resolution, instance lookup and events.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::{BeanDefinition, BeanManager, ScopeType};
///
/// struct Pond {
///     ducks: u32,
/// }
///
/// let manager = BeanManager::new();
/// let pond = BeanDefinition::builder_for::<Pond>()
///     .scope(ScopeType::singleton())
///     .constructor(|_| Ok(Pond { ducks: 4 }))
///     .build()
///     .unwrap();
/// manager.register(pond).unwrap();
///
/// let pond = manager.get::<Pond>(&[]).unwrap();
/// assert_eq!(pond.ducks, 4);
/// ```
#[derive(Clone)]
pub struct BeanManager {
    inner: Arc<ManagerInner>,
}

impl BeanManager {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Start configuring a manager.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Create a manager from a validated configuration.
    pub fn with_config(config: ManagerConfig) -> Self {
        let registry = Registry::with_capacity(config.capacity);
        for qualifier_type in &config.qualifier_types {
            registry.declare_qualifier(qualifier_type);
        }

        let contexts = ContextRegistry::new();
        if config.builtin_contexts {
            contexts.add(Arc::new(DependentContext::new()));
            contexts.add(Arc::new(ScopedContext::active(ScopeType::singleton())));
            contexts.add(Arc::new(ScopedContext::active(ScopeType::application())));
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            enabled = config.precedence.enabled().len(),
            builtin_contexts = config.builtin_contexts,
            "Created bean manager"
        );

        Self {
            inner: Arc::new(ManagerInner {
                registry: Arc::new(registry),
                resolver: Resolver::new(),
                precedence: config.precedence,
                contexts: Arc::new(contexts),
                observers: Arc::new(EventBus::new()),
                locked: AtomicBool::new(false),
            }),
        }
    }

    /// Create a child manager.
    ///
    /// The child sees every bean and observer of this manager plus its own;
    /// this manager never sees the child's. Contexts are shared, so both
    /// agree on what is active.
    pub fn child(&self) -> Self {
        #[cfg(feature = "logging")]
        debug!(target: "contextual_beans", "Creating child manager");

        Self {
            inner: Arc::new(ManagerInner {
                registry: Arc::new(self.inner.registry.child()),
                resolver: Resolver::new(),
                precedence: self.inner.precedence.clone(),
                contexts: Arc::clone(&self.inner.contexts),
                observers: Arc::new(self.inner.observers.child()),
                locked: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    // =========================================================================
    // Deployment
    // =========================================================================

    /// Add a bean.
    ///
    /// A specializing bean needs its target registered first, with a strictly
    /// lower precedence, and no other bean specializing it.
    pub fn register(&self, bean: Arc<BeanDefinition>) -> Result<()> {
        self.ensure_unlocked()?;
        qualifier::ensure_no_duplicates(bean.qualifiers(), &*bean)?;

        if let Some(target_id) = bean.specializes() {
            let target = self.inner.registry.get(target_id).ok_or_else(|| {
                DiError::InconsistentSpecialization {
                    bean: bean.to_string(),
                    reason: format!("specialized bean {target_id} is not registered"),
                }
            })?;
            if !self.inner.precedence.has_higher_precedence(&bean, &target) {
                return Err(DiError::InconsistentSpecialization {
                    bean: bean.to_string(),
                    reason: format!("precedence must be higher than that of {target}"),
                });
            }
        }

        self.inner.registry.insert(Arc::clone(&bean))?;
        self.inner.resolver.clear();

        #[cfg(feature = "logging")]
        debug!(target: "contextual_beans", bean = %bean, "Registered bean");

        Ok(())
    }

    /// Remove a bean registered with this manager.
    pub fn unregister(&self, id: BeanId) -> Result<Arc<BeanDefinition>> {
        self.ensure_unlocked()?;
        let bean = self
            .inner
            .registry
            .remove(id)
            .ok_or_else(|| DiError::UnknownBean { bean: id.to_string() })?;
        self.inner.resolver.clear();

        #[cfg(feature = "logging")]
        debug!(target: "contextual_beans", bean = %bean, "Unregistered bean");

        Ok(bean)
    }

    /// Declare a qualifier type that no registered bean mentions.
    pub fn add_qualifier_type(&self, qualifier_type: QualifierType) {
        self.inner.registry.declare_qualifier(&qualifier_type);
    }

    /// Close deployment. The bean set cannot change afterwards.
    pub fn lock(&self) {
        self.inner.locked.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            beans = self.inner.registry.len(),
            "Manager locked"
        );
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            return Err(DiError::Locked);
        }
        Ok(())
    }

    /// Every visible bean in definition order.
    pub fn beans(&self) -> Vec<Arc<BeanDefinition>> {
        self.inner.registry.all()
    }

    pub fn bean(&self, id: BeanId) -> Option<Arc<BeanDefinition>> {
        self.inner.registry.get(id)
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    #[inline]
    pub fn precedence(&self) -> &Precedence {
        &self.inner.precedence
    }

    /// Check the whole deployment; see [`validator`](crate::validator).
    pub fn validate(&self) -> Result<()> {
        validator::validate(self)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a type and qualifiers to exactly one bean.
    pub fn resolve(&self, ty: &TypeDescriptor, qualifiers: &[Qualifier]) -> Result<Arc<BeanDefinition>> {
        self.inner.resolver.resolve(
            &self.inner.registry,
            &self.inner.precedence,
            ty,
            qualifiers,
            None,
        )
    }

    /// Every highest-precedence bean satisfying the request.
    pub fn resolve_all(
        &self,
        ty: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> Result<Vec<Arc<BeanDefinition>>> {
        self.inner
            .resolver
            .resolve_all(&self.inner.registry, &self.inner.precedence, ty, qualifiers)
            .map(|candidates| candidates.to_vec())
    }

    /// Every visible bean with the given name. Never reduced to one bean.
    pub fn resolve_by_name(&self, name: &str) -> Vec<Arc<BeanDefinition>> {
        self.inner
            .resolver
            .resolve_by_name(&self.inner.registry, &self.inner.precedence, name)
            .to_vec()
    }

    /// Resolve the bean to inject at `injection_point`.
    pub fn resolve_injection_point(&self, injection_point: &InjectionPoint) -> Result<Arc<BeanDefinition>> {
        self.inner.resolver.resolve(
            &self.inner.registry,
            &self.inner.precedence,
            injection_point.required_type(),
            injection_point.required_qualifiers(),
            Some(injection_point as &dyn fmt::Display),
        )
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// A reference to the instance of `bean`, or of the bean specializing it.
    ///
    /// Normal-scoped beans yield a client proxy; nothing is created until the
    /// proxy is used.
    pub fn get_instance(&self, bean: &Arc<BeanDefinition>) -> Result<ContextualReference> {
        let bean = self.inner.registry.most_specialized(bean);
        if bean.scope().is_normal() {
            return self.client_proxy(bean, None);
        }

        let context = self.get_context(bean.scope())?;
        let mut creational = CreationalContext::new(self);
        let product = context.get(&bean, Some(&mut creational))?;
        Ok(reference_to(bean, product))
    }

    /// The existing instance of `bean` in its active context, without
    /// creating one.
    pub fn get_instance_if_exists(&self, bean: &Arc<BeanDefinition>) -> Result<Option<Instance>> {
        let bean = self.inner.registry.most_specialized(bean);
        self.get_context(bean.scope())?.get(&bean, None)
    }

    /// Resolve and look up in one step.
    pub fn get_instance_by_type(
        &self,
        ty: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> Result<ContextualReference> {
        let bean = self.resolve(ty, qualifiers)?;
        self.get_instance(&bean)
    }

    /// Resolve `T` and return its current instance.
    pub fn get<T: Injectable>(&self, qualifiers: &[Qualifier]) -> Result<Arc<T>> {
        self.get_instance_by_type(&TypeDescriptor::of::<T>(), qualifiers)?
            .get::<T>()
    }

    /// Look up the bean named `name`.
    ///
    /// No bean is `Ok(None)`; several are ambiguous.
    pub fn get_instance_by_name(&self, name: &str) -> Result<Option<ContextualReference>> {
        let candidates = self.resolve_by_name(name);
        match candidates.as_slice() {
            [] => Ok(None),
            [bean] => self.get_instance(bean).map(Some),
            many => Err(DiError::Ambiguous {
                request: format!("name \"{name}\""),
                candidates: many.iter().map(|bean| bean.to_string()).collect(),
            }),
        }
    }

    /// The reference to inject at `injection_point` during an ongoing
    /// creation.
    pub fn get_instance_to_inject(
        &self,
        injection_point: &InjectionPoint,
        creational: &mut CreationalContext<'_>,
    ) -> Result<ContextualReference> {
        let bean = self.resolve_injection_point(injection_point)?;

        #[cfg(feature = "logging")]
        trace!(
            target: "contextual_beans",
            injection_point = %injection_point,
            bean = %bean,
            "Injecting"
        );

        if bean.scope().is_normal() {
            return self.client_proxy(bean, Some(injection_point));
        }

        let context = self.get_context(bean.scope())?;
        let product = context.get(&bean, Some(creational))?;
        Ok(reference_to(bean, product))
    }

    /// The instance of `bean` in its active context, created within
    /// `creational` when absent.
    pub(crate) fn contextual_instance(
        &self,
        bean: &Arc<BeanDefinition>,
        creational: &mut CreationalContext<'_>,
    ) -> Result<Option<Instance>> {
        self.get_context(bean.scope())?.get(bean, Some(creational))
    }

    fn client_proxy(
        &self,
        bean: Arc<BeanDefinition>,
        injection_point: Option<&InjectionPoint>,
    ) -> Result<ContextualReference> {
        let primitive_target = injection_point.is_some_and(|ip| ip.required_type().is_primitive());
        if !bean.is_proxyable() || primitive_target {
            return Err(DiError::Unproxyable {
                bean: bean.to_string(),
                injection_point: injection_point.map(ToString::to_string),
            });
        }
        Ok(ContextualReference::Proxy(ClientProxy::new(
            bean,
            self.downgrade(),
        )))
    }

    // =========================================================================
    // Contexts
    // =========================================================================

    pub fn add_context(&self, context: Arc<dyn Context>) {
        self.inner.contexts.add(context);
    }

    /// The single active context for `scope`.
    pub fn get_context(&self, scope: &ScopeType) -> Result<Arc<dyn Context>> {
        self.inner.contexts.get_active(scope)
    }

    #[inline]
    pub fn contexts(&self) -> &ContextRegistry {
        &self.inner.contexts
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Register a function observer.
    pub fn add_observer(
        &self,
        observed: ObservedEvent,
        observer: impl Observer + 'static,
    ) -> Result<ObserverId> {
        self.check_observed(&observed)?;
        Ok(self.inner.observers.add(ObserverRegistration::new(
            observed,
            ObserverTarget::Function(Arc::new(observer)),
        )))
    }

    /// Register an observer method of `bean`.
    ///
    /// `callback` receives the bean's current instance. With
    /// [`Notify::IfExists`] the observer is skipped unless an instance already
    /// exists in an active context; dependent beans cannot declare such
    /// observers.
    pub fn add_bean_observer<F>(
        &self,
        observed: ObservedEvent,
        bean: &Arc<BeanDefinition>,
        notify: Notify,
        callback: F,
    ) -> Result<ObserverId>
    where
        F: Fn(&Instance, &Event) -> Result<()> + Send + Sync + 'static,
    {
        self.check_observed(&observed)?;
        if notify == Notify::IfExists && bean.scope().is_dependent() {
            return Err(DiError::InvalidConfiguration(format!(
                "dependent bean {bean} cannot declare a conditional observer"
            )));
        }
        Ok(self.inner.observers.add(ObserverRegistration::new(
            observed,
            ObserverTarget::Bean {
                bean: Arc::clone(bean),
                notify,
                callback: Arc::new(callback),
            },
        )))
    }

    fn check_observed(&self, observed: &ObservedEvent) -> Result<()> {
        observed.observed_type().ensure_concrete()?;
        qualifier::ensure_no_duplicates(observed.qualifiers(), observed.observed_type())?;
        for qualifier in observed.qualifiers() {
            self.inner.registry.declare_qualifier(qualifier.qualifier_type());
        }
        Ok(())
    }

    /// Remove an observer registered with this manager.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// The observers of an event of type `ty` with `qualifiers`, in
    /// notification order.
    pub fn observers_for(
        &self,
        ty: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> Result<Vec<Arc<ObserverRegistration>>> {
        self.observers_of(std::slice::from_ref(ty), qualifiers)
    }

    fn observers_of(
        &self,
        types: &[TypeDescriptor],
        qualifiers: &[Qualifier],
    ) -> Result<Vec<Arc<ObserverRegistration>>> {
        for ty in types {
            Resolver::validate_request(&self.inner.registry, ty, qualifiers, ty)?;
        }
        Ok(self.inner.observers.resolve(types, qualifiers))
    }

    /// Deliver `event` to `observers` in order.
    ///
    /// Stops at the first failing observer. Returns how many observers were
    /// notified; conditional observers without an instance are skipped.
    pub fn notify(&self, observers: &[Arc<ObserverRegistration>], event: &Event) -> Result<usize> {
        let mut notified = 0;
        for registration in observers {
            let delivered = self
                .deliver(registration, event)
                .map_err(|err| DiError::observer_failed(registration.to_string(), err.to_string()))?;
            if delivered {
                notified += 1;
            } else {
                #[cfg(feature = "logging")]
                trace!(
                    target: "contextual_beans",
                    observer = %registration,
                    "Skipped conditional observer without instance"
                );
            }
        }
        Ok(notified)
    }

    fn deliver(&self, registration: &ObserverRegistration, event: &Event) -> Result<bool> {
        match registration.target() {
            ObserverTarget::Function(observer) => observer.notify(event).map(|()| true),
            ObserverTarget::Bean {
                bean,
                notify,
                callback,
            } => {
                let instance = match notify {
                    Notify::Always => self.get_instance(bean)?.instance()?,
                    Notify::IfExists => match self.get_instance_if_exists(bean) {
                        Ok(instance) => instance,
                        Err(DiError::ContextNotActive { .. }) => None,
                        Err(err) => return Err(err),
                    },
                };
                match instance {
                    Some(instance) => callback(&instance, event).map(|()| true),
                    None => Ok(false),
                }
            }
        }
    }

    /// Fire `event` to every observer interested in it.
    pub fn fire_event(&self, event: &Event) -> Result<usize> {
        let observers = self.observers_of(event.types(), event.qualifiers())?;

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_beans",
            event = %event,
            observers = observers.len(),
            "Firing event"
        );

        self.notify(&observers, event)
    }
}

fn reference_to(bean: Arc<BeanDefinition>, product: Option<Instance>) -> ContextualReference {
    match product {
        Some(instance) => ContextualReference::Instance { bean, instance },
        None => ContextualReference::Null { bean },
    }
}

impl Default for BeanManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BeanManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanManager")
            .field("beans", &self.inner.registry.len())
            .field("observers", &self.inner.observers.len())
            .field("enabled", &self.inner.precedence.enabled())
            .field("locked", &self.is_locked())
            .field("has_parent", &self.inner.registry.parent().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConstructorFactory, DeploymentType, ErrorKind, ThreadBoundContext};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn fish(label: &str) -> Arc<BeanDefinition> {
        BeanDefinition::builder(label)
            .with_type("Fish")
            .instance(label.to_string())
            .build()
            .unwrap()
    }

    #[test]
    fn test_cod_salmon_ambiguity_then_removal() {
        let manager = BeanManager::new();
        let cod = fish("Cod");
        let salmon = fish("Salmon");
        manager.register(Arc::clone(&cod)).unwrap();
        manager.register(Arc::clone(&salmon)).unwrap();

        let fish_type = TypeDescriptor::from("Fish");
        match manager.resolve(&fish_type, &[]).unwrap_err() {
            DiError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().any(|c| c.contains("Cod")));
                assert!(candidates.iter().any(|c| c.contains("Salmon")));
            }
            other => panic!("expected ambiguity, got {other}"),
        }

        manager.unregister(salmon.id()).unwrap();
        assert_eq!(manager.resolve(&fish_type, &[]).unwrap().id(), cod.id());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let manager = BeanManager::new();
        let cod = fish("Cod");
        manager.register(Arc::clone(&cod)).unwrap();

        let fish_type = TypeDescriptor::from("Fish");
        for _ in 0..5 {
            assert_eq!(manager.resolve(&fish_type, &[]).unwrap().id(), cod.id());
        }
        let err = manager
            .resolve(&fish_type, &[Qualifier::named("Tame")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Request);
    }

    #[test]
    fn test_whitefish_by_name() {
        let manager = BeanManager::new();
        for label in ["Cod", "Haddock", "Plaice"] {
            let bean = BeanDefinition::builder(label).name("whitefish").build().unwrap();
            manager.register(bean).unwrap();
        }
        assert_eq!(manager.resolve_by_name("whitefish").len(), 3);
        assert!(matches!(
            manager.get_instance_by_name("whitefish"),
            Err(DiError::Ambiguous { .. })
        ));

        let sole = BeanDefinition::builder("Sole").name("whitefish").build().unwrap();
        manager.register(sole).unwrap();
        assert_eq!(manager.resolve_by_name("whitefish").len(), 4);
        assert!(manager.get_instance_by_name("tuna").unwrap().is_none());
    }

    #[test]
    fn test_specialization_masks_target() {
        let manager = BeanManager::builder()
            .enabled_deployment_types([DeploymentType::standard(), DeploymentType::new("AnotherDeploymentType")])
            .build()
            .unwrap();

        let tuna = BeanDefinition::builder("Tuna")
            .with_type("Fish")
            .instance(String::from("tuna"))
            .build()
            .unwrap();
        let albacore = BeanDefinition::builder("Albacore")
            .with_type("Fish")
            .deployment_type(DeploymentType::new("AnotherDeploymentType"))
            .specializes(&tuna)
            .instance(String::from("albacore"))
            .build()
            .unwrap();
        manager.register(Arc::clone(&tuna)).unwrap();
        manager.register(Arc::clone(&albacore)).unwrap();

        let resolved = manager.resolve(&TypeDescriptor::from("Fish"), &[]).unwrap();
        assert_eq!(resolved.id(), albacore.id());

        // Lookups of the specialized bean are redirected.
        let reference = manager.get_instance(&tuna).unwrap();
        assert_eq!(reference.bean().id(), albacore.id());
        assert_eq!(*reference.get::<String>().unwrap(), "albacore");
    }

    #[test]
    fn test_specialization_needs_higher_precedence() {
        let manager = BeanManager::new();
        let tuna = fish("Tuna");
        manager.register(Arc::clone(&tuna)).unwrap();

        let same_rank = BeanDefinition::builder("Albacore")
            .specializes(&tuna)
            .build()
            .unwrap();
        assert!(matches!(
            manager.register(same_rank),
            Err(DiError::InconsistentSpecialization { .. })
        ));

        let orphan = BeanDefinition::builder("Bluefin")
            .specializes_id(BeanId::new())
            .build()
            .unwrap();
        assert!(matches!(
            manager.register(orphan),
            Err(DiError::InconsistentSpecialization { .. })
        ));
    }

    #[test]
    fn test_lock_closes_deployment() {
        let manager = BeanManager::new();
        let cod = fish("Cod");
        manager.register(Arc::clone(&cod)).unwrap();
        assert!(matches!(
            manager.register(Arc::clone(&cod)),
            Err(DiError::AlreadyRegistered { .. })
        ));

        manager.lock();
        assert!(manager.is_locked());
        assert!(matches!(manager.register(fish("Salmon")), Err(DiError::Locked)));
        assert!(matches!(manager.unregister(cod.id()), Err(DiError::Locked)));
        assert!(manager.resolve(&TypeDescriptor::from("Fish"), &[]).is_ok());
    }

    #[test]
    fn test_child_manager_visibility() {
        let parent = BeanManager::new();
        let cod = fish("Cod");
        parent.register(Arc::clone(&cod)).unwrap();

        let child = parent.child();
        let salmon = BeanDefinition::builder("Salmon")
            .instance(String::from("salmon"))
            .build()
            .unwrap();
        child.register(Arc::clone(&salmon)).unwrap();

        let cod_type = TypeDescriptor::from("Cod");
        let salmon_type = TypeDescriptor::from("Salmon");
        assert!(child.resolve(&cod_type, &[]).is_ok());
        assert!(child.resolve(&salmon_type, &[]).is_ok());
        assert!(matches!(
            parent.resolve(&salmon_type, &[]),
            Err(DiError::Unsatisfied { .. })
        ));
        assert_eq!(child.beans().len(), 2);
        assert_eq!(parent.beans().len(), 1);
    }

    #[test]
    fn test_singleton_shared_and_dependent_fresh() {
        let manager = BeanManager::new();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let net = BeanDefinition::builder("Net")
            .scope(ScopeType::singleton())
            .constructor(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("net"))
            })
            .build()
            .unwrap();
        let hook = BeanDefinition::builder("Hook")
            .constructor(|_| Ok(String::from("hook")))
            .build()
            .unwrap();
        manager.register(Arc::clone(&net)).unwrap();
        manager.register(Arc::clone(&hook)).unwrap();

        let a = manager.get_instance(&net).unwrap().get::<String>().unwrap();
        let b = manager.get_instance(&net).unwrap().get::<String>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);

        let c = manager.get_instance(&hook).unwrap().get::<String>().unwrap();
        let d = manager.get_instance(&hook).unwrap().get::<String>().unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
        assert!(manager.get_instance_if_exists(&hook).unwrap().is_none());
    }

    #[test]
    fn test_dependents_destroyed_with_session_instance() {
        static DUCKS_DESTROYED: AtomicUsize = AtomicUsize::new(0);

        struct Pond {
            duck: Arc<String>,
        }

        let manager = BeanManager::new();
        let session = Arc::new(ScopedContext::active(ScopeType::session()));
        manager.add_context(Arc::clone(&session) as Arc<dyn Context>);

        let duck = BeanDefinition::builder("Duck")
            .factory(ConstructorFactory::new(|_| Ok(String::from("quack"))).pre_destroy(|_| {
                DUCKS_DESTROYED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .build()
            .unwrap();
        let pond = BeanDefinition::builder_for::<Pond>()
            .scope(ScopeType::session())
            .injection_point(InjectionPoint::new("Duck".into()).member("duck"))
            .constructor(|ctx| {
                let duck = ctx.inject_as::<String>(&InjectionPoint::new("Duck".into()).member("duck"))?;
                Ok(Pond { duck })
            })
            .build()
            .unwrap();
        manager.register(duck).unwrap();
        manager.register(pond).unwrap();

        let pond = manager.get::<Pond>(&[]).unwrap();
        assert_eq!(*pond.duck, "quack");
        assert_eq!(DUCKS_DESTROYED.load(Ordering::SeqCst), 0);

        assert!(session.deactivate().is_empty());
        assert_eq!(DUCKS_DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_normal_scope_into_primitive_is_unproxyable() {
        let manager = BeanManager::new();
        let count = BeanDefinition::builder("u32")
            .scope(ScopeType::application())
            .instance(7u32)
            .build()
            .unwrap();
        manager.register(count).unwrap();

        let mut creational = CreationalContext::new(&manager);
        let err = manager
            .get_instance_to_inject(&InjectionPoint::of::<u32>(), &mut creational)
            .unwrap_err();
        assert!(matches!(err, DiError::Unproxyable { injection_point: Some(_), .. }));
    }

    #[test]
    fn test_unproxyable_bean() {
        let manager = BeanManager::new();
        let sealed = BeanDefinition::builder("Sealed")
            .scope(ScopeType::application())
            .unproxyable()
            .instance(())
            .build()
            .unwrap();
        manager.register(Arc::clone(&sealed)).unwrap();

        let err = manager.get_instance(&sealed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unproxyable);
        let err = manager.resolve(&TypeDescriptor::from("Sealed"), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unproxyable);
    }

    #[test]
    fn test_missing_context_reported() {
        let manager = BeanManager::new();
        let cart = BeanDefinition::builder("Cart")
            .scope(ScopeType::request())
            .instance(0u8)
            .build()
            .unwrap();
        manager.register(Arc::clone(&cart)).unwrap();

        // The proxy is handed out; using it needs an active request.
        let reference = manager.get_instance(&cart).unwrap();
        assert!(matches!(reference.instance(), Err(DiError::ContextNotActive { .. })));

        let request = Arc::new(ThreadBoundContext::new(ScopeType::request()));
        manager.add_context(Arc::clone(&request) as Arc<dyn Context>);
        request.activate();
        assert_eq!(*reference.get::<u8>().unwrap(), 0);
        request.deactivate();
    }

    #[test]
    fn test_observers_in_priority_order() {
        let manager = BeanManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for (priority, tag) in [(10, "late"), (-5, "early"), (0, "middle")] {
            let seen = Arc::clone(&seen);
            manager
                .add_observer(
                    ObservedEvent::of::<String>().priority(priority),
                    move |event: &Event| -> Result<()> {
                        let payload = event.payload_as::<String>().cloned().unwrap_or_default();
                        seen.lock().unwrap().push(format!("{tag}:{payload}"));
                        Ok(())
                    },
                )
                .unwrap();
        }

        let notified = manager.fire_event(&Event::new(String::from("splash"))).unwrap();
        assert_eq!(notified, 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["early:splash", "middle:splash", "late:splash"]
        );
    }

    #[test]
    fn test_observer_qualifiers_and_failure() {
        let manager = BeanManager::new();
        let tame = Qualifier::named("Tame");

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        manager
            .add_observer(
                ObservedEvent::of::<u32>().qualifier(tame.clone()),
                move |_: &Event| -> Result<()> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(manager.fire_event(&Event::new(1u32)).unwrap(), 0);
        assert_eq!(
            manager.fire_event(&Event::new(1u32).qualifier(tame.clone())).unwrap(),
            1
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            manager
                .observers_for(&TypeDescriptor::of::<u32>(), &[tame.clone()])
                .unwrap()
                .len(),
            1
        );

        let failing = manager
            .add_observer(ObservedEvent::of::<u32>().priority(-1), |_: &Event| -> Result<()> {
                Err(DiError::creation_failed("Net", "torn"))
            })
            .unwrap();
        let err = manager.fire_event(&Event::new(2u32).qualifier(tame)).unwrap_err();
        assert!(matches!(err, DiError::ObserverFailed { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(manager.remove_observer(failing));
        assert!(!manager.remove_observer(failing));
    }

    #[test]
    fn test_conditional_bean_observer() {
        let manager = BeanManager::new();
        let session = Arc::new(ScopedContext::new(ScopeType::session()));
        manager.add_context(Arc::clone(&session) as Arc<dyn Context>);

        let angler = BeanDefinition::builder("Angler")
            .scope(ScopeType::session())
            .constructor(|_| Ok(AtomicUsize::new(0)))
            .build()
            .unwrap();
        manager.register(Arc::clone(&angler)).unwrap();
        manager
            .add_bean_observer(
                ObservedEvent::of::<String>(),
                &angler,
                Notify::IfExists,
                |instance: &Instance, _: &Event| {
                    if let Some(catches) = instance.downcast_ref::<AtomicUsize>() {
                        catches.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                },
            )
            .unwrap();

        let bite = Event::new(String::from("bite"));
        // Inactive context and no instance are both skipped.
        assert_eq!(manager.fire_event(&bite).unwrap(), 0);
        session.activate();
        assert_eq!(manager.fire_event(&bite).unwrap(), 0);

        let catches = manager.get_instance(&angler).unwrap().get::<AtomicUsize>().unwrap();
        assert_eq!(manager.fire_event(&bite).unwrap(), 1);
        assert_eq!(catches.load(Ordering::SeqCst), 1);

        let dependent = BeanDefinition::builder("Bobber").build().unwrap();
        assert!(matches!(
            manager.add_bean_observer(
                ObservedEvent::of::<String>(),
                &dependent,
                Notify::IfExists,
                |_: &Instance, _: &Event| Ok(()),
            ),
            Err(DiError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_wildcard_event_type_rejected() {
        let manager = BeanManager::new();
        let result = manager.add_observer(
            ObservedEvent::new(TypeDescriptor::generic("List", vec![TypeDescriptor::wildcard()])),
            |_: &Event| -> Result<()> { Ok(()) },
        );
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Request);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_constructs_once() {
        let manager = BeanManager::new();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let harbour = BeanDefinition::builder("Harbour")
            .scope(ScopeType::application())
            .constructor(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                Ok(String::from("harbour"))
            })
            .build()
            .unwrap();
        manager.register(Arc::clone(&harbour)).unwrap();
        manager.lock();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                let harbour = Arc::clone(&harbour);
                tokio::task::spawn_blocking(move || {
                    manager.get_instance(&harbour).unwrap().get::<String>().unwrap()
                })
            })
            .collect();

        let mut instances = Vec::new();
        for task in tasks {
            instances.push(task.await.unwrap());
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
