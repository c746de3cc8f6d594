//! Error types for bean resolution and contextual instance management

use thiserror::Error;

/// Coarse classification of a [`DiError`].
///
/// Callers that only need to decide whether a failure is a malformed request,
/// a resolution outcome or a lifecycle problem can match on this instead of
/// the full error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself was malformed
    Request,
    /// No bean matched
    Unsatisfied,
    /// More than one highest-precedence bean matched
    Ambiguous,
    /// A normal-scoped bean cannot be handed out through a client proxy
    Unproxyable,
    /// Zero or several active contexts for a scope
    ContextState,
    /// A shared scope received a `None` product
    IllegalProduct,
    /// Creating an instance failed
    Construction,
    /// Destroying an instance failed
    Destruction,
    /// The deployment (bean set or configuration) is inconsistent
    Deployment,
    /// An observer failed while being notified
    Observer,
}

/// Errors that can occur during resolution, instance creation and event delivery
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// The same qualifier type appeared twice in one request
    #[error("Duplicate qualifier type {qualifier} in {request}")]
    DuplicateQualifier { qualifier: String, request: String },

    /// An annotation that is not a declared qualifier type was used as one
    #[error("{annotation} is not a qualifier type")]
    NotAQualifier { annotation: String },

    /// The required type contains a wildcard or a type variable
    #[error("Cannot resolve non-concrete type {type_name}: {reason}")]
    NonConcreteType {
        type_name: String,
        reason: &'static str,
    },

    /// No bean satisfies the request
    #[error("Unsatisfied dependency: no bean matches {request}")]
    Unsatisfied { request: String },

    /// More than one bean with the highest precedence satisfies the request
    #[error("Ambiguous dependency: {request} resolved to {}", .candidates.join(", "))]
    Ambiguous {
        request: String,
        candidates: Vec<String>,
    },

    /// A normal-scoped bean would need a client proxy it cannot have
    #[error("Unproxyable dependency: normal scoped bean {bean} cannot be proxied{}", at_injection_point(.injection_point))]
    Unproxyable {
        bean: String,
        injection_point: Option<String>,
    },

    /// No context for the scope reports itself active
    #[error("No active contexts for scope type {scope}")]
    ContextNotActive { scope: String },

    /// More than one context for the scope reports itself active
    #[error("More than one context active for scope type {scope} ({count} active)")]
    MultipleActiveContexts { scope: String, count: usize },

    /// A bean in a shared scope produced `None`
    ///
    /// `cleanup_failures` holds the failures met while destroying the
    /// dependents created for the missing product.
    #[error("Bean {bean} produced no instance, which is only legal in the dependent scope (scope is {scope})")]
    IllegalProduct {
        bean: String,
        scope: String,
        cleanup_failures: Vec<DiError>,
    },

    /// A bean eagerly depends on itself within one creation
    #[error("Circular dependency detected while creating: {bean} (path: {})", .path.join(" -> "))]
    CircularDependency { bean: String, path: Vec<String> },

    /// Creating an instance failed
    #[error("Failed to create {bean}{}: {reason}", at_injection_point(.injection_point))]
    CreationFailed {
        bean: String,
        injection_point: Option<String>,
        reason: String,
        #[source]
        source: Option<Box<DiError>>,
    },

    /// A pre-destroy or disposal callback failed
    #[error("Failed to destroy {bean}: {reason}")]
    DestructionFailed { bean: String, reason: String },

    /// A nullable bean resolved into a primitive injection point
    #[error("Nullable dependency: {bean} may be injected as null into primitive injection point {injection_point}")]
    NullableDependency {
        bean: String,
        injection_point: String,
    },

    /// The specialization invariant was broken
    #[error("Inconsistent specialization of {bean}: {reason}")]
    InconsistentSpecialization { bean: String, reason: String },

    /// A bean with the same identity is already registered
    #[error("Bean already registered: {bean}")]
    AlreadyRegistered { bean: String },

    /// The bean is not known to this manager
    #[error("Unknown bean: {bean}")]
    UnknownBean { bean: String },

    /// Deployment is closed and the bean set cannot change anymore
    #[error("Manager is locked - cannot change registered beans")]
    Locked,

    /// The manager configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An observer failed while handling an event
    #[error("Observer {observer} failed: {reason}")]
    ObserverFailed { observer: String, reason: String },

    /// An instance was requested as a Rust type it does not have
    #[error("Instance of {bean} is not a {expected}")]
    TypeMismatch { bean: String, expected: &'static str },

    /// A dependent producer yielded no instance where one was required
    #[error("Bean {bean} produced no instance")]
    NullReference { bean: String },

    /// A client proxy outlived the manager that issued it
    #[error("Bean manager was dropped - client proxy for {bean} is no longer usable")]
    ManagerDropped { bean: String },
}

fn at_injection_point(injection_point: &Option<String>) -> String {
    match injection_point {
        Some(ip) => format!(" at injection point {ip}"),
        None => String::new(),
    }
}

impl DiError {
    /// Create a CreationFailed error for user code that failed outright
    #[inline]
    pub fn creation_failed(bean: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            bean: bean.into(),
            injection_point: None,
            reason: reason.into(),
            source: None,
        }
    }

    /// Wrap an error raised while creating `bean`, optionally at an injection point
    pub fn while_creating(self, bean: impl Into<String>, injection_point: Option<String>) -> Self {
        let reason = self.to_string();
        Self::CreationFailed {
            bean: bean.into(),
            injection_point,
            reason,
            source: Some(Box::new(self)),
        }
    }

    /// Create a DestructionFailed error
    #[inline]
    pub fn destruction_failed(bean: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DestructionFailed {
            bean: bean.into(),
            reason: reason.into(),
        }
    }

    /// Create an ObserverFailed error
    #[inline]
    pub fn observer_failed(observer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ObserverFailed {
            observer: observer.into(),
            reason: reason.into(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateQualifier { .. }
            | Self::NotAQualifier { .. }
            | Self::NonConcreteType { .. }
            | Self::TypeMismatch { .. }
            | Self::NullReference { .. } => ErrorKind::Request,
            Self::Unsatisfied { .. } => ErrorKind::Unsatisfied,
            Self::Ambiguous { .. } => ErrorKind::Ambiguous,
            Self::Unproxyable { .. } => ErrorKind::Unproxyable,
            Self::ContextNotActive { .. }
            | Self::MultipleActiveContexts { .. }
            | Self::ManagerDropped { .. } => ErrorKind::ContextState,
            Self::IllegalProduct { .. } => ErrorKind::IllegalProduct,
            Self::CircularDependency { .. } | Self::CreationFailed { .. } => {
                ErrorKind::Construction
            }
            Self::DestructionFailed { .. } => ErrorKind::Destruction,
            Self::NullableDependency { .. }
            | Self::InconsistentSpecialization { .. }
            | Self::AlreadyRegistered { .. }
            | Self::UnknownBean { .. }
            | Self::Locked
            | Self::InvalidConfiguration(_) => ErrorKind::Deployment,
            Self::ObserverFailed { .. } => ErrorKind::Observer,
        }
    }

    /// Walk nested creation failures down to the error that started them.
    pub fn root_cause(&self) -> &DiError {
        let mut current = self;
        while let Self::CreationFailed {
            source: Some(inner),
            ..
        } = current
        {
            current = inner;
        }
        current
    }
}

/// Result type alias for bean operations
pub type Result<T> = std::result::Result<T, DiError>;
