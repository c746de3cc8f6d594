//! Demo of the structured logging emitted by the bean manager
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use contextual_beans::{
    BeanDefinition, BeanManager, ConstructorFactory, Context, DeploymentType, Event,
    InjectionPoint, ObservedEvent, Qualifier, ScopeType, ThreadBoundContext, TypeDescriptor,
};
use std::sync::Arc;

#[allow(dead_code)]
struct Harbour {
    berths: u32,
}

#[allow(dead_code)]
struct Catch {
    harbour: Arc<Harbour>,
    kilos: u32,
}

fn main() {
    // JSON if logging-json is enabled, pretty if logging-pretty is
    #[cfg(feature = "logging")]
    contextual_beans::logging::builder().trace().beans_only().init();

    println!("=== Contextual Beans Logging Demo ===\n");

    // Logs: "Created bean manager", "Registered context"
    let manager = BeanManager::builder()
        .enabled_deployment_types([DeploymentType::standard(), DeploymentType::new("Mock")])
        .build()
        .expect("valid configuration");
    let request = Arc::new(ThreadBoundContext::new(ScopeType::request()));
    manager.add_context(Arc::clone(&request) as Arc<dyn Context>);

    // Logs: "Registered bean"
    let harbour = BeanDefinition::builder_for::<Harbour>()
        .scope(ScopeType::application())
        .constructor(|_| Ok(Harbour { berths: 12 }))
        .build()
        .expect("valid bean");
    let catch = BeanDefinition::builder_for::<Catch>()
        .scope(ScopeType::request())
        .injection_point(InjectionPoint::of::<Harbour>())
        .factory(
            ConstructorFactory::new(|ctx| {
                let harbour = ctx.inject_as::<Harbour>(&InjectionPoint::of::<Harbour>())?;
                Ok(Catch { harbour, kilos: 40 })
            })
            .pre_destroy(|_| {
                println!("  [App] Catch sold at the end of the request");
                Ok(())
            }),
        )
        .build()
        .expect("valid bean");
    manager.register(harbour).expect("registered");
    manager.register(catch).expect("registered");

    // Logs: "Deployment validated", "Manager locked"
    manager.validate().expect("consistent deployment");
    manager.lock();

    // Logs: "Context activated on thread", "Resolution cache miss",
    // "Injecting", "Created contextual instance"
    request.activate();
    let first = manager.get::<Catch>(&[]).expect("catch");
    println!("  [App] Landed {} kilos", first.kilos);

    // Logs: "Resolution cache hit"
    let _again = manager.get::<Catch>(&[]).expect("catch");

    // Logs: "Registered observer", "Firing event"
    manager
        .add_observer(
            ObservedEvent::of::<String>().qualifier(Qualifier::named("Storm")),
            |event: &Event| -> contextual_beans::Result<()> {
                println!("  [App] Storm warning: {:?}", event.payload_as::<String>());
                Ok(())
            },
        )
        .expect("observer");
    manager
        .fire_event(&Event::new(String::from("gale force 8")).qualifier(Qualifier::named("Storm")))
        .expect("delivered");

    // An unsatisfied request, reported with the injection point
    let missing = manager.resolve(&TypeDescriptor::from("Whale"), &[]);
    println!("  [App] {}", missing.expect_err("no whales here"));

    // Logs: "Destroyed contextual instance", "Context deactivated on thread"
    let failures = request.deactivate();
    assert!(failures.is_empty());

    println!("\n=== Demo Complete ===");
    println!("Tip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
