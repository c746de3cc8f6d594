//! Creational context
//!
//! Carries the state of one creation: the manager, the chain of beans
//! currently under construction and the dependent instances created for the
//! bean being built. It is passed explicitly down the creation call chain.

use crate::store::DependentInstance;
use crate::{
    BeanDefinition, BeanManager, ContextualReference, DiError, Injectable, InjectionPoint,
    Instance, Result,
};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// State of an in-progress creation.
pub struct CreationalContext<'a> {
    manager: &'a BeanManager,
    stack: Vec<Arc<BeanDefinition>>,
    dependents: Vec<DependentInstance>,
}

impl<'a> CreationalContext<'a> {
    /// Start a creation rooted at `manager`.
    pub fn new(manager: &'a BeanManager) -> Self {
        Self {
            manager,
            stack: Vec::new(),
            dependents: Vec::new(),
        }
    }

    /// A context for creating `bean` as a dependency of the current bean.
    ///
    /// Fails when `bean` is already being created further up the chain.
    pub(crate) fn for_bean(&self, bean: &Arc<BeanDefinition>) -> Result<CreationalContext<'a>> {
        self.ensure_not_creating(bean)?;

        let mut stack = self.stack.clone();
        stack.push(Arc::clone(bean));
        Ok(CreationalContext {
            manager: self.manager,
            stack,
            dependents: Vec::new(),
        })
    }

    /// Fail with a circular dependency when `bean` is already being created
    /// further up the chain.
    pub(crate) fn ensure_not_creating(&self, bean: &BeanDefinition) -> Result<()> {
        if self.stack.iter().any(|b| b.id() == bean.id()) {
            let mut path: Vec<String> = self.stack.iter().map(|b| b.to_string()).collect();
            path.push(bean.to_string());
            return Err(DiError::CircularDependency {
                bean: bean.to_string(),
                path,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn manager(&self) -> &'a BeanManager {
        self.manager
    }

    /// The bean being created, if any.
    #[inline]
    pub fn current_bean(&self) -> Option<&Arc<BeanDefinition>> {
        self.stack.last()
    }

    /// How deep in a creation chain this context is.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Describe the bean being created for diagnostics.
    pub fn describe_current(&self) -> String {
        match self.current_bean() {
            Some(bean) => bean.to_string(),
            None => String::from("<no bean>"),
        }
    }

    /// Obtain the reference to inject at `injection_point`.
    ///
    /// Errors are wrapped with the bean under construction and the injection
    /// point so the failing edge of the graph is visible.
    pub fn inject(&mut self, injection_point: &InjectionPoint) -> Result<ContextualReference> {
        let manager = self.manager;
        manager
            .get_instance_to_inject(injection_point, self)
            .map_err(|err| self.wrap(err, injection_point))
    }

    /// Inject and downcast to `T`; a missing product is an error.
    pub fn inject_as<T: Injectable>(&mut self, injection_point: &InjectionPoint) -> Result<Arc<T>> {
        self.inject_optional(injection_point)?.ok_or_else(|| {
            DiError::NullReference {
                bean: injection_point.to_string(),
            }
            .while_creating(self.describe_current(), Some(injection_point.to_string()))
        })
    }

    /// Inject and downcast to `T`, allowing a dependent producer to yield
    /// nothing.
    ///
    /// Client proxies are dereferenced within this creation, so an eager
    /// cycle through normal scopes is reported instead of recursing.
    pub fn inject_optional<T: Injectable>(
        &mut self,
        injection_point: &InjectionPoint,
    ) -> Result<Option<Arc<T>>> {
        let reference = self.inject(injection_point)?;
        let instance = match &reference {
            ContextualReference::Proxy(proxy) => {
                let proxy = proxy.clone();
                Some(
                    proxy
                        .instance_within(self)
                        .map_err(|err| self.wrap(err, injection_point))?,
                )
            }
            ContextualReference::Instance { instance, .. } => Some(Arc::clone(instance)),
            ContextualReference::Null { .. } => None,
        };

        match instance {
            Some(instance) => crate::provider::downcast::<T>(instance, &reference.describe())
                .map(Some)
                .map_err(|err| self.wrap(err, injection_point)),
            None => Ok(None),
        }
    }

    fn wrap(&self, err: DiError, injection_point: &InjectionPoint) -> DiError {
        // Failures already attributed to this edge are passed through as-is.
        if let DiError::CreationFailed {
            injection_point: Some(ip),
            ..
        } = &err
        {
            if *ip == injection_point.to_string() {
                return err;
            }
        }
        err.while_creating(self.describe_current(), Some(injection_point.to_string()))
    }

    /// Record a dependent instance to be destroyed with the current bean.
    pub(crate) fn add_dependent(&mut self, dependent: DependentInstance) {
        #[cfg(feature = "logging")]
        trace!(
            target: "contextual_beans",
            parent = %self.describe_current(),
            dependent = %dependent.bean(),
            "Recorded dependent instance"
        );

        self.dependents.push(dependent);
    }

    pub(crate) fn take_dependents(&mut self) -> Vec<DependentInstance> {
        std::mem::take(&mut self.dependents)
    }
}

/// Create an instance of `bean` within `parent`.
///
/// Returns the product (if any) together with the dependents created for it.
/// Failures that are not already construction failures are wrapped with the
/// bean.
pub(crate) fn create_instance(
    bean: &Arc<BeanDefinition>,
    parent: &CreationalContext<'_>,
) -> Result<(Option<Instance>, Vec<DependentInstance>)> {
    let mut ctx = parent.for_bean(bean)?;
    let product = bean.create(&mut ctx).map_err(|err| match err {
        DiError::CreationFailed { .. } | DiError::CircularDependency { .. } => err,
        other => other.while_creating(bean.to_string(), None),
    })?;
    Ok((product, ctx.take_dependents()))
}
