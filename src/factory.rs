//! Factories: how a bean's instances are created and destroyed
//!
//! A [`Factory`] is the construction protocol of one bean. Three flavors cover
//! the common cases:
//!
//! - [`ConstructorFactory`] - construct (injecting dependencies through the
//!   [`CreationalContext`]), then an optional post-construct callback; an
//!   optional pre-destroy callback on destruction
//! - [`ProducerFactory`] - a producer that may yield no value, with an
//!   optional disposer
//! - [`InstanceFactory`] - hands out a pre-built instance

use crate::{CreationalContext, DiError, Injectable, Instance, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Creates and destroys the instances of one bean.
pub trait Factory: Send + Sync {
    /// Create a new instance.
    ///
    /// `Ok(None)` is a null product; only legal for dependent-scoped beans.
    fn create(&self, ctx: &mut CreationalContext<'_>) -> Result<Option<Instance>>;

    /// Run destruction callbacks for an instance this factory created.
    fn destroy(&self, _instance: Instance) -> Result<()> {
        Ok(())
    }
}

type ConstructFn<T> = Box<dyn Fn(&mut CreationalContext<'_>) -> Result<T> + Send + Sync>;
type CallbackFn<T> = Box<dyn Fn(&T) -> Result<()> + Send + Sync>;

// =============================================================================
// Constructor Factory
// =============================================================================

/// Factory for simple and enterprise beans.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::{ConstructorFactory, InjectionPoint, TypeDescriptor};
///
/// struct Pond;
/// struct Duck {
///     pond: std::sync::Arc<Pond>,
/// }
///
/// let factory = ConstructorFactory::new(|ctx| {
///     let pond = ctx.inject_as::<Pond>(&InjectionPoint::of::<Pond>())?;
///     Ok(Duck { pond })
/// })
/// .post_construct(|_duck| Ok(()));
/// ```
pub struct ConstructorFactory<T> {
    construct: ConstructFn<T>,
    post_construct: Option<CallbackFn<T>>,
    pre_destroy: Option<CallbackFn<T>>,
}

impl<T: Injectable> ConstructorFactory<T> {
    /// Create a factory from a constructor.
    pub fn new<F>(construct: F) -> Self
    where
        F: Fn(&mut CreationalContext<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            construct: Box::new(construct),
            post_construct: None,
            pre_destroy: None,
        }
    }

    /// Callback run right after construction, before the instance is shared.
    pub fn post_construct<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.post_construct = Some(Box::new(callback));
        self
    }

    /// Callback run when the instance is destroyed.
    pub fn pre_destroy<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_destroy = Some(Box::new(callback));
        self
    }
}

impl<T: Injectable> Factory for ConstructorFactory<T> {
    fn create(&self, ctx: &mut CreationalContext<'_>) -> Result<Option<Instance>> {
        let instance = (self.construct)(ctx)?;
        if let Some(post_construct) = &self.post_construct {
            post_construct(&instance)?;
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "contextual_beans",
            instance_type = std::any::type_name::<T>(),
            "Constructed new instance"
        );

        Ok(Some(instance.into_instance()))
    }

    fn destroy(&self, instance: Instance) -> Result<()> {
        let Some(pre_destroy) = &self.pre_destroy else {
            return Ok(());
        };
        let typed = crate::provider::downcast::<T>(instance, std::any::type_name::<T>())?;
        pre_destroy(&typed)
    }
}

// =============================================================================
// Producer Factory
// =============================================================================

type ProduceFn<T> = Box<dyn Fn(&mut CreationalContext<'_>) -> Result<Option<T>> + Send + Sync>;

/// Factory for producer beans, which may produce no value at all.
pub struct ProducerFactory<T> {
    produce: ProduceFn<T>,
    disposer: Option<CallbackFn<T>>,
}

impl<T: Injectable> ProducerFactory<T> {
    /// Create a factory from a producer.
    pub fn new<F>(produce: F) -> Self
    where
        F: Fn(&mut CreationalContext<'_>) -> Result<Option<T>> + Send + Sync + 'static,
    {
        Self {
            produce: Box::new(produce),
            disposer: None,
        }
    }

    /// Disposer run when a produced instance is destroyed.
    pub fn disposer<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.disposer = Some(Box::new(callback));
        self
    }
}

impl<T: Injectable> Factory for ProducerFactory<T> {
    fn create(&self, ctx: &mut CreationalContext<'_>) -> Result<Option<Instance>> {
        Ok((self.produce)(ctx)?.map(Injectable::into_instance))
    }

    fn destroy(&self, instance: Instance) -> Result<()> {
        let Some(disposer) = &self.disposer else {
            return Ok(());
        };
        let typed = crate::provider::downcast::<T>(instance, std::any::type_name::<T>())?;
        disposer(&typed)
    }
}

// =============================================================================
// Instance Factory
// =============================================================================

/// Factory that hands out a pre-built instance.
///
/// Stores the type-erased `Arc` directly so every creation is an `Arc` clone.
pub struct InstanceFactory {
    instance: Instance,
}

impl InstanceFactory {
    /// Create from an existing value
    #[inline]
    pub fn new<T: Injectable>(instance: T) -> Self {
        Self {
            instance: instance.into_instance(),
        }
    }

    /// Create from an Arc
    #[inline]
    pub fn from_arc<T: Injectable>(instance: Arc<T>) -> Self {
        Self {
            instance: instance as Instance,
        }
    }
}

impl Factory for InstanceFactory {
    #[inline]
    fn create(&self, _ctx: &mut CreationalContext<'_>) -> Result<Option<Instance>> {
        Ok(Some(Arc::clone(&self.instance)))
    }
}

/// Factory that always fails; stands in for beans whose construction is
/// handled elsewhere (for example enterprise beans owned by another container).
pub(crate) struct UnavailableFactory;

impl Factory for UnavailableFactory {
    fn create(&self, ctx: &mut CreationalContext<'_>) -> Result<Option<Instance>> {
        Err(DiError::creation_failed(
            ctx.describe_current(),
            "bean has no factory",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BeanDefinition, BeanManager};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Trout {
        id: u32,
    }

    fn creation_ctx(manager: &BeanManager) -> CreationalContext<'_> {
        CreationalContext::new(manager)
    }

    #[test]
    fn test_constructor_runs_post_construct() {
        static INITIALIZED: AtomicU32 = AtomicU32::new(0);

        let manager = BeanManager::new();
        let factory = ConstructorFactory::new(|_| Ok(Trout { id: 7 })).post_construct(|_| {
            INITIALIZED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut ctx = creation_ctx(&manager);
        let instance = factory.create(&mut ctx).unwrap().unwrap();
        assert_eq!(instance.downcast::<Trout>().unwrap().id, 7);
        assert_eq!(INITIALIZED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_post_construct_fails_creation() {
        let manager = BeanManager::new();
        let factory = ConstructorFactory::new(|_| Ok(Trout { id: 1 }))
            .post_construct(|_| Err(DiError::creation_failed("Trout", "lake is frozen")));

        let mut ctx = creation_ctx(&manager);
        assert!(factory.create(&mut ctx).is_err());
    }

    #[test]
    fn test_pre_destroy_receives_instance() {
        static DESTROYED: AtomicU32 = AtomicU32::new(0);

        let manager = BeanManager::new();
        let factory = ConstructorFactory::new(|_| Ok(Trout { id: 42 })).pre_destroy(|trout| {
            DESTROYED.store(trout.id, Ordering::SeqCst);
            Ok(())
        });

        let mut ctx = creation_ctx(&manager);
        let instance = factory.create(&mut ctx).unwrap().unwrap();
        factory.destroy(instance).unwrap();
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_producer_may_yield_nothing() {
        let manager = BeanManager::new();
        let factory = ProducerFactory::<Trout>::new(|_| Ok(None));

        let mut ctx = creation_ctx(&manager);
        assert!(factory.create(&mut ctx).unwrap().is_none());
    }

    #[test]
    fn test_instance_factory_shares_arc() {
        let manager = BeanManager::new();
        let factory = InstanceFactory::new(Trout { id: 3 });

        let mut ctx = creation_ctx(&manager);
        let a = factory.create(&mut ctx).unwrap().unwrap();
        let b = factory.create(&mut ctx).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_unavailable_factory_fails() {
        let manager = BeanManager::new();
        let bean = BeanDefinition::builder("Ejb").build().unwrap();
        let mut ctx = creation_ctx(&manager);
        let err = bean.create(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("no factory"));
    }
}
