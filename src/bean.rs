//! Bean definitions
//!
//! A [`BeanDefinition`] is the pre-computed metadata of one injectable
//! component: its type closure, qualifiers, scope, deployment type, optional
//! name and specialization link, plus the [`Factory`] that creates it.
//! Definitions are immutable once built.

use crate::factory::UnavailableFactory;
use crate::qualifier::{self, Qualifier};
use crate::{
    ConstructorFactory, CreationalContext, DeploymentType, DiError, Factory, Injectable,
    InstanceFactory, Instance, ProducerFactory, Result, ScopeType, TypeDescriptor,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity of a bean definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeanId(u64);

impl BeanId {
    /// Generate a new unique bean ID.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for BeanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bean-{}", self.0)
    }
}

/// What kind of component backs a bean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BeanKind {
    /// A plain constructed component
    #[default]
    Simple,
    /// A component managed by an enterprise container
    Enterprise,
    /// The product of a producer method or field
    Producer,
}

/// A place where a bean asks for a dependency.
///
/// Carries the required type and qualifiers, plus enough description for
/// diagnostics. Passed explicitly through resolution and creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InjectionPoint {
    ty: TypeDescriptor,
    qualifiers: Vec<Qualifier>,
    declaring_bean: Option<BeanId>,
    member: Option<Arc<str>>,
}

impl InjectionPoint {
    pub fn new(ty: TypeDescriptor) -> Self {
        Self {
            ty,
            qualifiers: Vec::new(),
            declaring_bean: None,
            member: None,
        }
    }

    /// An injection point for a Rust type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeDescriptor::of::<T>())
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn qualifiers(mut self, qualifiers: impl IntoIterator<Item = Qualifier>) -> Self {
        self.qualifiers.extend(qualifiers);
        self
    }

    /// Name the field, parameter or method this injection point stands for.
    pub fn member(mut self, member: impl Into<Arc<str>>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub(crate) fn declared_by(mut self, bean: BeanId) -> Self {
        self.declaring_bean = Some(bean);
        self
    }

    #[inline]
    pub fn required_type(&self) -> &TypeDescriptor {
        &self.ty
    }

    #[inline]
    pub fn required_qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    #[inline]
    pub fn declaring_bean(&self) -> Option<BeanId> {
        self.declaring_bean
    }
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.qualifiers.is_empty() {
            write!(f, "{} ", qualifier::describe(&self.qualifiers))?;
        }
        write!(f, "{}", self.ty)?;
        if let Some(member) = &self.member {
            write!(f, " {member}")?;
        }
        if let Some(bean) = self.declaring_bean {
            write!(f, " of {bean}")?;
        }
        Ok(())
    }
}

/// One injectable component.
///
/// # Examples
///
/// ```rust
/// use contextual_beans::{BeanDefinition, Qualifier, ScopeType, TypeDescriptor};
///
/// let cod = BeanDefinition::builder("Cod")
///     .with_type("Fish")
///     .qualifier(Qualifier::named("Whitefish"))
///     .scope(ScopeType::application())
///     .name("whitefish")
///     .build()
///     .unwrap();
///
/// assert_eq!(cod.types().len(), 2);
/// assert_eq!(cod.name(), Some("whitefish"));
/// ```
pub struct BeanDefinition {
    id: BeanId,
    label: Arc<str>,
    kind: BeanKind,
    types: Vec<TypeDescriptor>,
    qualifiers: Vec<Qualifier>,
    scope: ScopeType,
    deployment_type: DeploymentType,
    name: Option<Arc<str>>,
    nullable: bool,
    proxyable: bool,
    specializes: Option<BeanId>,
    injection_points: Vec<InjectionPoint>,
    factory: Arc<dyn Factory>,
}

impl BeanDefinition {
    /// Start building a bean whose own type is `bean_type`.
    pub fn builder(bean_type: impl Into<TypeDescriptor>) -> BeanBuilder {
        BeanBuilder::new(bean_type.into())
    }

    /// Start building a bean for a Rust type.
    pub fn builder_for<T: Injectable>() -> BeanBuilder {
        BeanBuilder::new(TypeDescriptor::of::<T>())
    }

    #[inline]
    pub fn id(&self) -> BeanId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> BeanKind {
        self.kind
    }

    /// The API types of the bean, its own type first.
    #[inline]
    pub fn types(&self) -> &[TypeDescriptor] {
        &self.types
    }

    /// The bean's own type.
    #[inline]
    pub fn bean_type(&self) -> &TypeDescriptor {
        &self.types[0]
    }

    #[inline]
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    #[inline]
    pub fn scope(&self) -> &ScopeType {
        &self.scope
    }

    #[inline]
    pub fn deployment_type(&self) -> &DeploymentType {
        &self.deployment_type
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn is_proxyable(&self) -> bool {
        self.proxyable
    }

    /// The bean this one supersedes, if any.
    #[inline]
    pub fn specializes(&self) -> Option<BeanId> {
        self.specializes
    }

    #[inline]
    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }

    /// Create a new instance through the bean's factory.
    pub fn create(&self, ctx: &mut CreationalContext<'_>) -> Result<Option<Instance>> {
        self.factory.create(ctx)
    }

    /// Run destruction callbacks for an instance of this bean.
    pub fn destroy(&self, instance: Instance) -> Result<()> {
        self.factory.destroy(instance)
    }
}

impl fmt::Display for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if let Some(name) = &self.name {
            write!(f, " \"{name}\"")?;
        }
        write!(
            f,
            " {} {} [{}]",
            self.scope,
            qualifier::describe(&self.qualifiers),
            self.deployment_type
        )
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("types", &self.types)
            .field("scope", &self.scope)
            .field("deployment_type", &self.deployment_type)
            .field("name", &self.name)
            .field("specializes", &self.specializes)
            .finish()
    }
}

/// Builder for [`BeanDefinition`].
pub struct BeanBuilder {
    id: BeanId,
    label: Option<Arc<str>>,
    kind: BeanKind,
    types: Vec<TypeDescriptor>,
    qualifiers: Vec<Qualifier>,
    scope: ScopeType,
    deployment_type: DeploymentType,
    name: Option<Arc<str>>,
    nullable: bool,
    proxyable: bool,
    specializes: Option<BeanId>,
    injection_points: Vec<InjectionPoint>,
    factory: Option<Arc<dyn Factory>>,
}

impl BeanBuilder {
    fn new(bean_type: TypeDescriptor) -> Self {
        Self {
            id: BeanId::new(),
            label: None,
            kind: BeanKind::Simple,
            types: vec![bean_type],
            qualifiers: Vec::new(),
            scope: ScopeType::dependent(),
            deployment_type: DeploymentType::production(),
            name: None,
            nullable: false,
            proxyable: true,
            specializes: None,
            injection_points: Vec::new(),
            factory: None,
        }
    }

    /// Add an API type (a supertype or implemented interface).
    pub fn with_type(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        let ty = ty.into();
        if !self.types.contains(&ty) {
            self.types.push(ty);
        }
        self
    }

    pub fn with_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeDescriptor>,
    {
        for ty in types {
            self = self.with_type(ty);
        }
        self
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn scope(mut self, scope: ScopeType) -> Self {
        self.scope = scope;
        self
    }

    pub fn deployment_type(mut self, deployment_type: DeploymentType) -> Self {
        self.deployment_type = deployment_type;
        self
    }

    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Diagnostic label; defaults to the bean's own type.
    pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(mut self, kind: BeanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark the bean type as impossible to wrap in a client proxy.
    pub fn unproxyable(mut self) -> Self {
        self.proxyable = false;
        self
    }

    /// Supersede another bean.
    pub fn specializes(mut self, target: &BeanDefinition) -> Self {
        self.specializes = Some(target.id());
        self
    }

    /// Supersede another bean by id.
    pub fn specializes_id(mut self, target: BeanId) -> Self {
        self.specializes = Some(target);
        self
    }

    /// Declare an injection point, checked by deployment validation.
    pub fn injection_point(mut self, injection_point: InjectionPoint) -> Self {
        self.injection_points.push(injection_point);
        self
    }

    /// Use an arbitrary factory.
    pub fn factory(mut self, factory: impl Factory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Construct instances with `construct`.
    pub fn constructor<T, F>(self, construct: F) -> Self
    where
        T: Injectable,
        F: Fn(&mut CreationalContext<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.factory(ConstructorFactory::new(construct))
    }

    /// Produce instances with `produce`; the bean becomes a producer bean.
    pub fn producer<T, F>(self, produce: F) -> Self
    where
        T: Injectable,
        F: Fn(&mut CreationalContext<'_>) -> Result<Option<T>> + Send + Sync + 'static,
    {
        self.kind(BeanKind::Producer)
            .nullable(true)
            .factory(ProducerFactory::new(produce))
    }

    /// Hand out a pre-built instance.
    pub fn instance<T: Injectable>(self, instance: T) -> Self {
        self.factory(InstanceFactory::new(instance))
    }

    /// Finish the definition.
    ///
    /// Fails when a type in the closure is not concrete, or when the bean
    /// specializes itself.
    pub fn build(self) -> Result<Arc<BeanDefinition>> {
        let label = self
            .label
            .unwrap_or_else(|| Arc::from(self.types[0].to_string()));

        for ty in &self.types {
            ty.ensure_concrete()?;
        }
        if self.specializes == Some(self.id) {
            return Err(DiError::InconsistentSpecialization {
                bean: label.to_string(),
                reason: "a bean cannot specialize itself".into(),
            });
        }

        let id = self.id;
        let injection_points = self
            .injection_points
            .into_iter()
            .map(|ip| ip.declared_by(id))
            .collect();

        Ok(Arc::new(BeanDefinition {
            id,
            label,
            kind: self.kind,
            types: self.types,
            qualifiers: qualifier::normalize_bean(self.qualifiers),
            scope: self.scope,
            deployment_type: self.deployment_type,
            name: self.name,
            nullable: self.nullable,
            proxyable: self.proxyable,
            specializes: self.specializes,
            injection_points,
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(UnavailableFactory) as Arc<dyn Factory>),
        }))
    }
}
