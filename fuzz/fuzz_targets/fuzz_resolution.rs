#![no_main]

//! Fuzz target for typesafe resolution
//!
//! Registers and removes arbitrary beans, then checks that resolution is a
//! pure function of the bean set: repeating a request, or asking a manager
//! with a cold cache holding the same beans, gives the same outcome.

use arbitrary::Arbitrary;
use contextual_beans::{
    BeanDefinition, BeanId, BeanManager, DeploymentType, DiError, Qualifier, TypeDescriptor,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

const TYPES: [&str; 3] = ["Fish", "Bird", "Stone"];
const QUALIFIERS: [&str; 3] = ["Tame", "Wild", "Chunky"];

#[derive(Debug, Arbitrary)]
struct BeanSpec {
    ty: u8,
    qualifier: Option<u8>,
    binding_value: bool,
    mock: bool,
    name: Option<u8>,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Register(BeanSpec),
    Unregister(u8),
    Resolve { ty: u8, qualifier: Option<u8>, binding_value: bool },
    ResolveByName(u8),
}

fn qualifier(index: u8, binding_value: bool) -> Qualifier {
    Qualifier::named(QUALIFIERS[index as usize % QUALIFIERS.len()]).with("value", binding_value)
}

fn build(spec: &BeanSpec) -> Arc<BeanDefinition> {
    let mut builder = BeanDefinition::builder(TypeDescriptor::class(format!("Bean{}", spec.ty)))
        .with_type(TYPES[spec.ty as usize % TYPES.len()])
        .instance(spec.ty);
    if let Some(index) = spec.qualifier {
        builder = builder.qualifier(qualifier(index, spec.binding_value));
    }
    if spec.mock {
        builder = builder.deployment_type(DeploymentType::new("Mock"));
    }
    if let Some(name) = spec.name {
        builder = builder.name(format!("bean{}", name % 4));
    }
    builder.build().unwrap()
}

fn manager() -> BeanManager {
    let builder = BeanManager::builder()
        .enabled_deployment_types([DeploymentType::standard(), DeploymentType::new("Mock")]);
    let builder = QUALIFIERS
        .iter()
        .fold(builder, |b, name| b.qualifier_type(contextual_beans::QualifierType::new(*name)));
    builder.build().unwrap()
}

/// Outcome of a request, reduced to something comparable across managers.
fn outcome(result: Result<Arc<BeanDefinition>, DiError>) -> Result<BeanId, String> {
    result.map(|bean| bean.id()).map_err(|err| format!("{:?}", err.kind()))
}

fuzz_target!(|ops: Vec<Op>| {
    let warm = manager();
    let mut registered: Vec<Arc<BeanDefinition>> = Vec::new();

    for op in ops.into_iter().take(64) {
        match op {
            Op::Register(spec) => {
                let bean = build(&spec);
                warm.register(Arc::clone(&bean)).unwrap();
                registered.push(bean);
            }
            Op::Unregister(index) => {
                if registered.is_empty() {
                    continue;
                }
                let bean = registered.remove(index as usize % registered.len());
                warm.unregister(bean.id()).unwrap();
            }
            Op::Resolve { ty, qualifier: q, binding_value } => {
                let ty = TypeDescriptor::from(TYPES[ty as usize % TYPES.len()]);
                let qualifiers: Vec<Qualifier> =
                    q.map(|index| qualifier(index, binding_value)).into_iter().collect();

                let first = outcome(warm.resolve(&ty, &qualifiers));
                let second = outcome(warm.resolve(&ty, &qualifiers));
                assert_eq!(first, second);

                let cold = manager();
                for bean in &registered {
                    cold.register(Arc::clone(bean)).unwrap();
                }
                assert_eq!(first, outcome(cold.resolve(&ty, &qualifiers)));
            }
            Op::ResolveByName(name) => {
                let name = format!("bean{}", name % 4);
                let expected = registered
                    .iter()
                    .filter(|bean| bean.name() == Some(name.as_str()))
                    .count();
                assert_eq!(warm.resolve_by_name(&name).len(), expected);
            }
        }
    }
});
