//! # Contextual Beans - Typesafe Resolution and Contextual Instances
//!
//! The core of a contextual dependency injection container: given a required
//! type and a set of qualifiers, find the one bean that satisfies them, then
//! hand out the instance that belongs to the scope activation currently in
//! effect.
//!
//! ## Features
//!
//! - **Typesafe resolution** - type and qualifier matching with binding and
//!   non-binding qualifier members
//! - **Deployment types** - an ordered precedence between bean classes, with
//!   specialization masking the bean it replaces
//! - **Contexts** - per-scope instance stores; at most one active context per
//!   scope, single construction under concurrent first access
//! - **Client proxies** - normal-scoped beans are handed out as handles that
//!   look up the active context on every use
//! - **Events** - observers resolved with the same qualifier rules
//! - **Lock-free reads** - `DashMap` backed indexes, caches and stores
//! - **Observable** - optional tracing with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use contextual_beans::{BeanDefinition, BeanManager, DiError, TypeDescriptor};
//!
//! let manager = BeanManager::new();
//!
//! let cod = BeanDefinition::builder("Cod")
//!     .with_type("Fish")
//!     .instance(String::from("cod"))
//!     .build()
//!     .unwrap();
//! let salmon = BeanDefinition::builder("Salmon")
//!     .with_type("Fish")
//!     .instance(String::from("salmon"))
//!     .build()
//!     .unwrap();
//! manager.register(cod.clone()).unwrap();
//! manager.register(salmon.clone()).unwrap();
//!
//! // Two beans of the same precedence: never resolved by declaration order
//! let fish = TypeDescriptor::from("Fish");
//! assert!(matches!(manager.resolve(&fish, &[]), Err(DiError::Ambiguous { .. })));
//!
//! manager.unregister(salmon.id()).unwrap();
//! let bean = manager.resolve(&fish, &[]).unwrap();
//! let instance = manager.get_instance(&bean).unwrap().get::<String>().unwrap();
//! assert_eq!(*instance, "cod");
//! ```
//!
//! ## Scopes and Contexts
//!
//! ```rust
//! use contextual_beans::{BeanDefinition, BeanManager, ScopeType, ScopedContext};
//! use std::sync::Arc;
//!
//! struct Cart {
//!     items: u32,
//! }
//!
//! let manager = BeanManager::new();
//! let session = Arc::new(ScopedContext::new(ScopeType::session()));
//! manager.add_context(session.clone());
//!
//! let cart = BeanDefinition::builder_for::<Cart>()
//!     .scope(ScopeType::session())
//!     .constructor(|_| Ok(Cart { items: 0 }))
//!     .build()
//!     .unwrap();
//! manager.register(cart.clone()).unwrap();
//!
//! // A client proxy: nothing exists until it is used in an active session
//! let proxy = manager.get_instance(&cart).unwrap();
//! assert!(proxy.get::<Cart>().is_err());
//!
//! session.activate();
//! assert_eq!(proxy.get::<Cart>().unwrap().items, 0);
//! assert!(session.deactivate().is_empty());
//! ```
//!
//! ## Qualifiers
//!
//! ```rust
//! use contextual_beans::{BeanDefinition, BeanManager, Qualifier, TypeDescriptor};
//!
//! let manager = BeanManager::new();
//! let chunky = Qualifier::named("Chunky").with("real", true);
//!
//! let tuna = BeanDefinition::builder("Tuna")
//!     .qualifier(chunky.clone())
//!     .instance(1u8)
//!     .build()
//!     .unwrap();
//! manager.register(tuna).unwrap();
//!
//! let tuna_type = TypeDescriptor::from("Tuna");
//! assert!(manager.resolve(&tuna_type, &[chunky]).is_ok());
//! // The bean declares a qualifier, so it no longer carries @Default
//! assert!(manager.resolve(&tuna_type, &[]).is_err());
//! ```

mod bean;
mod config;
mod context;
mod creational;
mod error;
mod event;
mod factory;
#[cfg(feature = "logging")]
pub mod logging;
mod manager;
pub mod matcher;
mod precedence;
mod provider;
mod qualifier;
mod reference;
mod registry;
mod resolver;
mod scope;
mod store;
mod types;
pub mod validator;

pub use bean::*;
pub use config::*;
pub use context::*;
pub use creational::*;
pub use error::*;
pub use event::*;
pub use factory::*;
pub use manager::*;
pub use precedence::*;
pub use provider::*;
pub use qualifier::*;
pub use reference::*;
pub use registry::*;
pub use resolver::*;
pub use scope::*;
pub use store::*;
pub use types::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BeanDefinition, BeanManager, Context, ContextualReference, CreationalContext,
        DeploymentType, DiError, Event, Injectable, InjectionPoint, Notify, ObservedEvent,
        Qualifier, QualifierType, Result, ScopeType, ScopedContext, ThreadBoundContext,
        TypeDescriptor,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Lure {
        colour: &'static str,
    }

    struct Angler {
        lure: Arc<Lure>,
    }

    #[test]
    fn test_request_scope_per_thread() {
        let manager = BeanManager::new();
        let request = Arc::new(ThreadBoundContext::new(ScopeType::request()));
        manager.add_context(Arc::clone(&request) as Arc<dyn Context>);

        static CREATED: AtomicUsize = AtomicUsize::new(0);
        let angler = BeanDefinition::builder_for::<Angler>()
            .scope(ScopeType::request())
            .injection_point(InjectionPoint::of::<Lure>())
            .constructor(|ctx| {
                CREATED.fetch_add(1, Ordering::SeqCst);
                let lure = ctx.inject_as::<Lure>(&InjectionPoint::of::<Lure>())?;
                Ok(Angler { lure })
            })
            .build()
            .unwrap();
        let lure = BeanDefinition::builder_for::<Lure>()
            .scope(ScopeType::singleton())
            .instance(Lure { colour: "red" })
            .build()
            .unwrap();
        manager.register(angler).unwrap();
        manager.register(lure).unwrap();
        manager.validate().unwrap();
        manager.lock();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                let request = Arc::clone(&request);
                thread::spawn(move || {
                    request.activate();
                    let first = manager.get::<Angler>(&[]).unwrap();
                    let second = manager.get::<Angler>(&[]).unwrap();
                    assert!(Arc::ptr_eq(&first, &second));
                    assert_eq!(first.lure.colour, "red");
                    request.deactivate()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_empty());
        }
        assert_eq!(CREATED.load(Ordering::SeqCst), 4);
        assert_eq!(request.activations(), 0);
    }

    #[test]
    fn test_eager_normal_scoped_cycle_reported() {
        let manager = BeanManager::new();
        let chicken = BeanDefinition::builder("Chicken")
            .scope(ScopeType::application())
            .injection_point(InjectionPoint::new("Egg".into()))
            .constructor(|ctx| {
                ctx.inject_as::<u8>(&InjectionPoint::new("Egg".into()))?;
                Ok(1u8)
            })
            .build()
            .unwrap();
        let egg = BeanDefinition::builder("Egg")
            .scope(ScopeType::application())
            .injection_point(InjectionPoint::new("Chicken".into()))
            .constructor(|ctx| {
                ctx.inject_as::<u8>(&InjectionPoint::new("Chicken".into()))?;
                Ok(2u8)
            })
            .build()
            .unwrap();
        manager.register(Arc::clone(&chicken)).unwrap();
        manager.register(egg).unwrap();

        // Lazy references resolve fine; eagerly dereferencing them cycles.
        assert!(manager.validate().is_ok());
        let err = manager.get_instance(&chicken).unwrap().instance().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(matches!(err.root_cause(), DiError::CircularDependency { .. }));

        // The failed creation left nothing behind.
        assert!(manager.get_instance_if_exists(&chicken).unwrap().is_none());
    }

    #[test]
    fn test_singleton_cycle_built_from_two_threads() {
        use std::sync::atomic::AtomicBool;
        use std::sync::{Barrier, mpsc};
        use std::time::Duration;

        let manager = BeanManager::new();
        let barrier = Arc::new(Barrier::new(2));

        // The first construction of each bean waits for the other thread so
        // both creations are in flight before either injects.
        let singleton = |own: &'static str, other: &'static str| {
            let barrier = Arc::clone(&barrier);
            let first = AtomicBool::new(true);
            BeanDefinition::builder(own)
                .scope(ScopeType::singleton())
                .injection_point(InjectionPoint::new(other.into()))
                .constructor(move |ctx| {
                    if first.swap(false, Ordering::SeqCst) {
                        barrier.wait();
                    }
                    ctx.inject_as::<u8>(&InjectionPoint::new(other.into()))?;
                    Ok(0u8)
                })
                .build()
                .unwrap()
        };
        let hen = singleton("Hen", "Nest");
        let nest = singleton("Nest", "Hen");
        manager.register(Arc::clone(&hen)).unwrap();
        manager.register(Arc::clone(&nest)).unwrap();

        let (tx, rx) = mpsc::channel();
        for root in ["Hen", "Nest"] {
            let manager = manager.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let result = manager.get_instance_by_type(&TypeDescriptor::from(root), &[]);
                let _ = tx.send(result.map(|_| ()));
            });
        }

        for _ in 0..2 {
            let err = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("singleton creations blocked each other")
                .unwrap_err();
            assert!(matches!(err.root_cause(), DiError::CircularDependency { .. }));
        }
        assert!(manager.get_instance_if_exists(&hen).unwrap().is_none());
        assert!(manager.get_instance_if_exists(&nest).unwrap().is_none());
    }

    #[test]
    fn test_lazy_normal_scoped_self_reference() {
        struct Node {
            next: ContextualReference,
        }

        let manager = BeanManager::new();
        let node_ip = InjectionPoint::of::<Node>();
        let node = BeanDefinition::builder_for::<Node>()
            .scope(ScopeType::application())
            .injection_point(node_ip.clone())
            .constructor(move |ctx| {
                let next = ctx.inject(&node_ip)?;
                Ok(Node { next })
            })
            .build()
            .unwrap();
        manager.register(node).unwrap();

        let node = manager.get::<Node>(&[]).unwrap();
        assert!(node.next.is_proxy());
        assert!(Arc::ptr_eq(&node, &node.next.get::<Node>().unwrap()));
    }

    #[test]
    fn test_child_manager_shares_contexts() {
        let parent = BeanManager::new();
        let net = BeanDefinition::builder("Net")
            .scope(ScopeType::singleton())
            .constructor(|_| Ok(String::from("net")))
            .build()
            .unwrap();
        parent.register(Arc::clone(&net)).unwrap();

        let child = parent.child();
        let from_parent = parent.get_instance(&net).unwrap().get::<String>().unwrap();
        let from_child = child.get_instance(&net).unwrap().get::<String>().unwrap();
        assert!(Arc::ptr_eq(&from_parent, &from_child));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        parent
            .add_observer(ObservedEvent::of::<u16>(), move |_: &Event| -> Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        child.fire_event(&Event::new(3u16)).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_deployment_type_invisible() {
        let manager = BeanManager::new();
        let mock = BeanDefinition::builder("Net")
            .deployment_type(DeploymentType::new("Mock"))
            .instance(())
            .build()
            .unwrap();
        manager.register(mock).unwrap();

        let err = manager.resolve(&TypeDescriptor::from("Net"), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsatisfied);
    }
}
