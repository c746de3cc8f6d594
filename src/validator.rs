//! Deployment validation
//!
//! Checks a complete bean set before it is put to use, so misconfigurations
//! surface once at startup instead of on the first unlucky lookup:
//!
//! - normal-scoped beans must be proxyable
//! - every specialization targets a registered bean of lower precedence
//! - every declared injection point resolves to exactly one bean
//! - nullable beans are never injected into primitive injection points
//! - normal-scoped beans are never injected into primitive injection points

use crate::{BeanDefinition, BeanManager, DiError, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Validate every bean visible from `manager`, stopping at the first problem.
pub fn validate(manager: &BeanManager) -> Result<()> {
    let beans = manager.beans();
    for bean in &beans {
        validate_bean(manager, bean)?;
    }

    #[cfg(feature = "logging")]
    debug!(target: "contextual_beans", beans = beans.len(), "Deployment validated");

    Ok(())
}

fn validate_bean(manager: &BeanManager, bean: &Arc<BeanDefinition>) -> Result<()> {
    if bean.scope().is_normal() && !bean.is_proxyable() {
        return Err(DiError::Unproxyable {
            bean: bean.to_string(),
            injection_point: None,
        });
    }

    if let Some(target_id) = bean.specializes() {
        let target = manager
            .bean(target_id)
            .ok_or_else(|| DiError::InconsistentSpecialization {
                bean: bean.to_string(),
                reason: format!("specialized bean {target_id} is not registered"),
            })?;
        if !manager.precedence().has_higher_precedence(bean, &target) {
            return Err(DiError::InconsistentSpecialization {
                bean: bean.to_string(),
                reason: format!("precedence must be higher than that of {target}"),
            });
        }
    }

    for injection_point in bean.injection_points() {
        let resolved = manager.resolve_injection_point(injection_point)?;
        if !injection_point.required_type().is_primitive() {
            continue;
        }
        if resolved.is_nullable() {
            return Err(DiError::NullableDependency {
                bean: resolved.to_string(),
                injection_point: injection_point.to_string(),
            });
        }
        if resolved.scope().is_normal() {
            return Err(DiError::Unproxyable {
                bean: resolved.to_string(),
                injection_point: Some(injection_point.to_string()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeploymentType, ErrorKind, InjectionPoint, ScopeType};

    #[test]
    fn test_consistent_deployment_passes() {
        let manager = BeanManager::new();
        let water = BeanDefinition::builder("Water").instance(()).build().unwrap();
        let pond = BeanDefinition::builder("Pond")
            .injection_point(InjectionPoint::new("Water".into()).member("water"))
            .instance(())
            .build()
            .unwrap();
        manager.register(water).unwrap();
        manager.register(pond).unwrap();
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_unsatisfied_injection_point() {
        let manager = BeanManager::new();
        let pond = BeanDefinition::builder("Pond")
            .injection_point(InjectionPoint::new("Water".into()).member("water"))
            .build()
            .unwrap();
        manager.register(pond).unwrap();

        let err = manager.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsatisfied);
        assert!(err.to_string().contains("water"));
    }

    #[test]
    fn test_nullable_into_primitive() {
        let manager = BeanManager::new();
        let depth = BeanDefinition::builder("i64")
            .producer(|_| Ok(Some(3i64)))
            .build()
            .unwrap();
        let boat = BeanDefinition::builder("Boat")
            .injection_point(InjectionPoint::of::<i64>().member("depth"))
            .build()
            .unwrap();
        manager.register(depth).unwrap();
        manager.register(boat).unwrap();

        assert!(matches!(
            manager.validate(),
            Err(DiError::NullableDependency { .. })
        ));
    }

    #[test]
    fn test_normal_scoped_into_primitive() {
        let manager = BeanManager::new();
        let depth = BeanDefinition::builder("i64")
            .scope(ScopeType::application())
            .instance(3i64)
            .build()
            .unwrap();
        let boat = BeanDefinition::builder("Boat")
            .injection_point(InjectionPoint::of::<i64>().member("depth"))
            .build()
            .unwrap();
        manager.register(depth).unwrap();
        manager.register(boat).unwrap();

        assert!(matches!(
            manager.validate(),
            Err(DiError::Unproxyable { injection_point: Some(_), .. })
        ));
    }

    #[test]
    fn test_unproxyable_normal_scoped_bean() {
        let manager = BeanManager::new();
        let sealed = BeanDefinition::builder("Sealed")
            .scope(ScopeType::session())
            .unproxyable()
            .build()
            .unwrap();
        manager.register(sealed).unwrap();

        assert!(matches!(
            manager.validate(),
            Err(DiError::Unproxyable { injection_point: None, .. })
        ));
    }

    #[test]
    fn test_specialization_of_unregistered_target() {
        let manager = BeanManager::builder()
            .enabled_deployment_types([DeploymentType::standard(), DeploymentType::new("Mock")])
            .build()
            .unwrap();
        let tuna = BeanDefinition::builder("Tuna").build().unwrap();
        let albacore = BeanDefinition::builder("Albacore")
            .deployment_type(DeploymentType::new("Mock"))
            .specializes(&tuna)
            .build()
            .unwrap();
        manager.register(Arc::clone(&tuna)).unwrap();
        manager.register(albacore).unwrap();
        assert!(manager.validate().is_ok());

        // Unregistering the target leaves the specialization dangling.
        manager.unregister(tuna.id()).unwrap();
        assert!(matches!(
            manager.validate(),
            Err(DiError::InconsistentSpecialization { .. })
        ));
    }
}
