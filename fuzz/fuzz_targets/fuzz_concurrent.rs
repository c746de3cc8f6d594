#![no_main]

//! Fuzz target for concurrent contextual lookups
//!
//! Threads race on first access to shared-context beans while others
//! activate and tear down a thread-bound context. Every bean of a shared
//! context must be constructed at most once per activation.

use arbitrary::Arbitrary;
use contextual_beans::{
    BeanDefinition, BeanManager, Context, ScopeType, ScopedContext, ThreadBoundContext, TypeDescriptor,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    GetShared(u8),
    GetRequest,
    Activate,
    Deactivate,
    Exists(u8),
}

#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    // Number of shared beans (clamped to 1-8)
    beans: u8,
    // Number of threads (clamped to 1-8)
    thread_count: u8,
    ops_per_thread: Vec<ThreadOp>,
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let manager = BeanManager::new();
    let request = Arc::new(ThreadBoundContext::new(ScopeType::request()));
    manager.add_context(Arc::clone(&request) as Arc<dyn Context>);
    let session = Arc::new(ScopedContext::active(ScopeType::session()));
    manager.add_context(Arc::clone(&session) as Arc<dyn Context>);

    let bean_count = (scenario.beans % 8).max(1) as usize;
    let constructions: Arc<Vec<AtomicUsize>> =
        Arc::new((0..bean_count).map(|_| AtomicUsize::new(0)).collect());

    let mut shared = Vec::new();
    for i in 0..bean_count {
        let counter = Arc::clone(&constructions);
        let scope = if i % 2 == 0 {
            ScopeType::application()
        } else {
            ScopeType::session()
        };
        let bean = BeanDefinition::builder(TypeDescriptor::class(format!("Shared{i}")))
            .scope(scope)
            .constructor(move |_| {
                counter[i].fetch_add(1, Ordering::SeqCst);
                Ok(i)
            })
            .build()
            .unwrap();
        manager.register(Arc::clone(&bean)).unwrap();
        shared.push(bean);
    }
    let per_request = BeanDefinition::builder("PerRequest")
        .scope(ScopeType::request())
        .constructor(|_| Ok(String::from("request")))
        .build()
        .unwrap();
    manager.register(Arc::clone(&per_request)).unwrap();
    manager.lock();

    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops = scenario.ops_per_thread;
    let shared = Arc::new(shared);

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let manager = manager.clone();
            let request = Arc::clone(&request);
            let shared = Arc::clone(&shared);
            let per_request = Arc::clone(&per_request);
            let ops = ops.clone();
            thread::spawn(move || {
                for op in ops.into_iter().take(50) {
                    match op {
                        ThreadOp::GetShared(index) => {
                            let bean = &shared[index as usize % shared.len()];
                            let value = manager.get_instance(bean).unwrap().get::<usize>().unwrap();
                            assert_eq!(*value, index as usize % shared.len());
                        }
                        ThreadOp::GetRequest => {
                            let result = manager.get_instance(&per_request).unwrap().get::<String>();
                            assert_eq!(result.is_ok(), request.is_active());
                        }
                        ThreadOp::Activate => request.activate(),
                        ThreadOp::Deactivate => {
                            assert!(request.deactivate().is_empty());
                        }
                        ThreadOp::Exists(index) => {
                            let bean = &shared[index as usize % shared.len()];
                            let _ = manager.get_instance_if_exists(bean).unwrap();
                        }
                    }
                }
                request.deactivate();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for count in constructions.iter() {
        assert!(count.load(Ordering::SeqCst) <= 1);
    }
    assert_eq!(request.activations(), 0);
    assert!(session.deactivate().is_empty());
});
