//! Contextual references
//!
//! What lookups and injection hand out. Pseudo-scoped beans are handed out
//! directly. Normal-scoped beans are handed out as a [`ClientProxy`] that
//! finds the instance of the currently active context on every access, so a
//! consumer never holds on to an instance of an activation that has ended.

use crate::manager::ManagerInner;
use crate::{BeanDefinition, BeanManager, CreationalContext, DiError, Injectable, Instance, Result};
use std::fmt;
use std::sync::{Arc, Weak};

/// A reference to a contextual instance.
#[derive(Clone)]
pub enum ContextualReference {
    /// The instance itself
    Instance {
        bean: Arc<BeanDefinition>,
        instance: Instance,
    },
    /// A dependent producer yielded nothing
    Null { bean: Arc<BeanDefinition> },
    /// A handle that resolves the active context's instance on access
    Proxy(ClientProxy),
}

impl ContextualReference {
    /// The bean behind the reference.
    pub fn bean(&self) -> &Arc<BeanDefinition> {
        match self {
            Self::Instance { bean, .. } | Self::Null { bean } => bean,
            Self::Proxy(proxy) => proxy.bean(),
        }
    }

    #[inline]
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null { .. })
    }

    /// The current instance; proxies look up the active context, creating
    /// the instance if it does not exist yet.
    pub fn instance(&self) -> Result<Option<Instance>> {
        match self {
            Self::Instance { instance, .. } => Ok(Some(Arc::clone(instance))),
            Self::Null { .. } => Ok(None),
            Self::Proxy(proxy) => proxy.instance().map(Some),
        }
    }

    /// The current instance as `T`.
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        self.get_optional()?.ok_or_else(|| DiError::NullReference {
            bean: self.describe(),
        })
    }

    /// The current instance as `T`, or `None` for a null product.
    pub fn get_optional<T: Injectable>(&self) -> Result<Option<Arc<T>>> {
        match self.instance()? {
            Some(instance) => crate::provider::downcast::<T>(instance, &self.describe()).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn describe(&self) -> String {
        self.bean().to_string()
    }
}

impl fmt::Debug for ContextualReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance { bean, .. } => f.debug_tuple("Instance").field(&bean.to_string()).finish(),
            Self::Null { bean } => f.debug_tuple("Null").field(&bean.to_string()).finish(),
            Self::Proxy(proxy) => proxy.fmt(f),
        }
    }
}

/// Client proxy for a normal-scoped bean.
///
/// Holds the manager weakly so instances that keep proxies to each other do
/// not keep the manager alive.
#[derive(Clone)]
pub struct ClientProxy {
    bean: Arc<BeanDefinition>,
    manager: Weak<ManagerInner>,
}

impl ClientProxy {
    pub(crate) fn new(bean: Arc<BeanDefinition>, manager: Weak<ManagerInner>) -> Self {
        Self { bean, manager }
    }

    #[inline]
    pub fn bean(&self) -> &Arc<BeanDefinition> {
        &self.bean
    }

    fn manager(&self) -> Result<BeanManager> {
        self.manager
            .upgrade()
            .map(BeanManager::from_inner)
            .ok_or_else(|| DiError::ManagerDropped {
                bean: self.bean.to_string(),
            })
    }

    /// The instance in the currently active context.
    pub fn instance(&self) -> Result<Instance> {
        let manager = self.manager()?;
        let mut creational = CreationalContext::new(&manager);
        self.instance_within(&mut creational)
    }

    /// Like [`instance`](Self::instance), inside an ongoing creation.
    pub(crate) fn instance_within(&self, creational: &mut CreationalContext<'_>) -> Result<Instance> {
        let manager = self.manager()?;
        manager
            .contextual_instance(&self.bean, creational)?
            .ok_or_else(|| DiError::NullReference {
                bean: self.bean.to_string(),
            })
    }

    /// The instance in the currently active context, as `T`.
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        crate::provider::downcast::<T>(self.instance()?, &self.bean.to_string())
    }
}

impl fmt::Debug for ClientProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProxy")
            .field("bean", &self.bean.to_string())
            .field("manager_alive", &(self.manager.strong_count() > 0))
            .finish()
    }
}
