//! Deployment types and precedence arbitration
//!
//! Every bean belongs to one deployment type. The manager is configured with
//! an ordered list of enabled deployment types, lowest precedence first.
//! Beans of a type not in the list are invisible to resolution; among the
//! remaining candidates only those of the highest enabled rank survive.

use crate::{BeanDefinition, DiError, Result};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Name of the deployment type of framework-provided beans.
pub const STANDARD: &str = "Standard";

/// Name of the deployment type beans get when they declare none.
pub const PRODUCTION: &str = "Production";

/// A named precedence class.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::DeploymentType;
///
/// let mock = DeploymentType::new("Mock");
/// assert_eq!(mock.to_string(), "@Mock");
/// assert_ne!(mock, DeploymentType::production());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentType {
    name: Arc<str>,
}

impl DeploymentType {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD)
    }

    pub fn production() -> Self {
        Self::new(PRODUCTION)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for DeploymentType {
    fn default() -> Self {
        Self::production()
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}

/// Total order over the enabled deployment types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precedence {
    enabled: Vec<DeploymentType>,
}

impl Precedence {
    /// Build the order from the enabled deployment types, lowest first.
    ///
    /// `Standard` must come first. `Production` is inserted right after it when
    /// missing. Listing a type twice is a configuration error.
    pub fn new(enabled: impl IntoIterator<Item = DeploymentType>) -> Result<Self> {
        let mut enabled: Vec<DeploymentType> = enabled.into_iter().collect();

        match enabled.first() {
            Some(first) if first.name() == STANDARD => {}
            Some(first) => {
                return Err(DiError::InvalidConfiguration(format!(
                    "{} must be the lowest precedence deployment type, found {first} first",
                    DeploymentType::standard()
                )));
            }
            None => {
                return Err(DiError::InvalidConfiguration(
                    "no deployment types are enabled".into(),
                ));
            }
        }

        for (i, ty) in enabled.iter().enumerate() {
            if enabled[..i].contains(ty) {
                return Err(DiError::InvalidConfiguration(format!(
                    "deployment type {ty} is enabled twice"
                )));
            }
        }

        let production = DeploymentType::production();
        if !enabled.contains(&production) {
            enabled.insert(1, production);
        }

        Ok(Self { enabled })
    }

    /// The enabled deployment types, lowest precedence first.
    #[inline]
    pub fn enabled(&self) -> &[DeploymentType] {
        &self.enabled
    }

    #[inline]
    pub fn is_enabled(&self, deployment_type: &DeploymentType) -> bool {
        self.enabled.contains(deployment_type)
    }

    /// Position in the enabled list; `None` when disabled.
    #[inline]
    pub fn rank(&self, deployment_type: &DeploymentType) -> Option<usize> {
        self.enabled.iter().position(|ty| ty == deployment_type)
    }

    /// Whether `bean` ranks strictly above `other`. Disabled types rank below
    /// every enabled type.
    pub fn has_higher_precedence(&self, bean: &BeanDefinition, other: &BeanDefinition) -> bool {
        self.rank(bean.deployment_type()) > self.rank(other.deployment_type())
    }

    /// Keep only the candidates of the highest rank present.
    pub fn retain_highest(&self, candidates: Vec<Arc<BeanDefinition>>) -> Vec<Arc<BeanDefinition>> {
        let Some(highest) = candidates
            .iter()
            .map(|bean| self.rank(bean.deployment_type()))
            .max()
        else {
            return candidates;
        };

        let retained: Vec<_> = candidates
            .into_iter()
            .filter(|bean| self.rank(bean.deployment_type()) == highest)
            .collect();

        #[cfg(feature = "logging")]
        trace!(
            target: "contextual_beans",
            retained = retained.len(),
            "Retained highest precedence candidates"
        );

        retained
    }

    /// Reduce the candidates to exactly one bean.
    ///
    /// A tie at the highest rank is an ambiguity; declaration order is never
    /// used to pick a winner.
    pub fn reduce(
        &self,
        candidates: Vec<Arc<BeanDefinition>>,
        request: &dyn fmt::Display,
    ) -> Result<Arc<BeanDefinition>> {
        let mut highest = self.retain_highest(candidates);
        match highest.len() {
            0 => Err(DiError::Unsatisfied {
                request: request.to_string(),
            }),
            1 => Ok(highest.remove(0)),
            _ => Err(DiError::Ambiguous {
                request: request.to_string(),
                candidates: highest.iter().map(|bean| bean.to_string()).collect(),
            }),
        }
    }
}

impl Default for Precedence {
    fn default() -> Self {
        Self {
            enabled: vec![DeploymentType::standard(), DeploymentType::production()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bean(label: &str, deployment_type: DeploymentType) -> Arc<BeanDefinition> {
        BeanDefinition::builder(label)
            .deployment_type(deployment_type)
            .build()
            .unwrap()
    }

    #[test]
    fn test_production_inserted_after_standard() {
        let precedence =
            Precedence::new([DeploymentType::standard(), DeploymentType::new("Mock")]).unwrap();
        assert_eq!(
            precedence.enabled(),
            &[
                DeploymentType::standard(),
                DeploymentType::production(),
                DeploymentType::new("Mock")
            ]
        );
    }

    #[test]
    fn test_standard_must_be_first() {
        let err = Precedence::new([DeploymentType::production(), DeploymentType::standard()])
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidConfiguration(_)));
        assert!(Precedence::new([]).is_err());
    }

    #[test]
    fn test_duplicates_rejected() {
        let result = Precedence::new([
            DeploymentType::standard(),
            DeploymentType::new("Mock"),
            DeploymentType::new("Mock"),
        ]);
        assert!(matches!(result, Err(DiError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_rank_and_enabled() {
        let precedence =
            Precedence::new([DeploymentType::standard(), DeploymentType::new("Mock")]).unwrap();
        assert_eq!(precedence.rank(&DeploymentType::standard()), Some(0));
        assert_eq!(precedence.rank(&DeploymentType::new("Mock")), Some(2));
        assert!(!precedence.is_enabled(&DeploymentType::new("Staging")));
    }

    #[test]
    fn test_reduce_picks_highest() {
        let precedence =
            Precedence::new([DeploymentType::standard(), DeploymentType::new("Mock")]).unwrap();
        let cod = bean("Cod", DeploymentType::production());
        let mock_cod = bean("MockCod", DeploymentType::new("Mock"));

        let winner = precedence
            .reduce(vec![cod, Arc::clone(&mock_cod)], &"Fish")
            .unwrap();
        assert_eq!(winner.id(), mock_cod.id());
    }

    #[test]
    fn test_reduce_tie_is_ambiguous() {
        let precedence = Precedence::default();
        let cod = bean("Cod", DeploymentType::production());
        let salmon = bean("Salmon", DeploymentType::production());

        let err = precedence.reduce(vec![cod, salmon], &"Fish").unwrap_err();
        match err {
            DiError::Ambiguous { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_higher_precedence() {
        let precedence = Precedence::default();
        let standard = bean("Clock", DeploymentType::standard());
        let production = bean("AtomicClock", DeploymentType::production());
        assert!(precedence.has_higher_precedence(&production, &standard));
        assert!(!precedence.has_higher_precedence(&standard, &production));
        assert!(!precedence.has_higher_precedence(&production, &production));
    }
}
