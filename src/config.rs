//! Manager configuration
//!
//! # Example
//!
//! ```rust
//! use contextual_beans::{BeanManager, DeploymentType, QualifierType};
//!
//! let manager = BeanManager::builder()
//!     .enabled_deployment_types([DeploymentType::standard(), DeploymentType::new("Mock")])
//!     .qualifier_type(QualifierType::new("Chunky"))
//!     .capacity(128)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(manager.precedence().enabled().len(), 3);
//! ```

use crate::{BeanManager, DeploymentType, Precedence, QualifierType, Result};

/// Validated manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub(crate) precedence: Precedence,
    pub(crate) qualifier_types: Vec<QualifierType>,
    pub(crate) capacity: usize,
    pub(crate) builtin_contexts: bool,
}

impl ManagerConfig {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    #[inline]
    pub fn precedence(&self) -> &Precedence {
        &self.precedence
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn builtin_contexts(&self) -> bool {
        self.builtin_contexts
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            precedence: Precedence::default(),
            qualifier_types: Vec::new(),
            capacity: 0,
            builtin_contexts: true,
        }
    }
}

/// Builder for [`ManagerConfig`]
#[derive(Debug, Clone)]
pub struct ManagerBuilder {
    enabled: Option<Vec<DeploymentType>>,
    qualifier_types: Vec<QualifierType>,
    capacity: usize,
    builtin_contexts: bool,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self {
            enabled: None,
            qualifier_types: Vec::new(),
            capacity: 0,
            builtin_contexts: true,
        }
    }
}

impl ManagerBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enabled deployment types, lowest precedence first.
    ///
    /// The list must start with `Standard`; `Production` is added after it
    /// when missing.
    pub fn enabled_deployment_types(
        mut self,
        enabled: impl IntoIterator<Item = DeploymentType>,
    ) -> Self {
        self.enabled = Some(enabled.into_iter().collect());
        self
    }

    /// Declare a qualifier type up front.
    pub fn qualifier_type(mut self, qualifier_type: QualifierType) -> Self {
        self.qualifier_types.push(qualifier_type);
        self
    }

    /// Pre-allocate the registry for `capacity` beans.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Install the dependent, singleton and application contexts (default on).
    pub fn builtin_contexts(mut self, enabled: bool) -> Self {
        self.builtin_contexts = enabled;
        self
    }

    /// Validate into a [`ManagerConfig`].
    pub fn config(self) -> Result<ManagerConfig> {
        let precedence = match self.enabled {
            Some(enabled) => Precedence::new(enabled)?,
            None => Precedence::default(),
        };
        Ok(ManagerConfig {
            precedence,
            qualifier_types: self.qualifier_types,
            capacity: self.capacity,
            builtin_contexts: self.builtin_contexts,
        })
    }

    /// Validate and create the manager.
    pub fn build(self) -> Result<BeanManager> {
        Ok(BeanManager::with_config(self.config()?))
    }
}
