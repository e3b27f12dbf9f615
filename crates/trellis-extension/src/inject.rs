//! Dependency injection for extension constructors.
//!
//! The original design injects dependencies through reflective setter
//! discovery; here every constructor receives an [`ExtensionInjector`] and
//! pulls its declared dependencies explicitly. The injector resolves through
//! the [`ObjectFactory`] extension point (itself adaptive), with the
//! hand-written [`AggregateObjectFactory`] chaining every registered source.
//! Absent dependencies are skipped and factory failures are logged; injection
//! never aborts construction.

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::point::{Extension, ExtensionPoint, Lifecycle};
use crate::registry::{self, ExtensionRegistry, Shared};
use crate::{descriptor_resource, extension_class};

/// A type-erased dependency lookup.
///
/// `name` is empty when the consumer wants the point's adaptive instance
/// (the common case for constructor injection).
pub struct DependencyRequest {
    /// `TypeId` of the requested extension point object type.
    pub point: TypeId,
    /// Qualified point id, for diagnostics.
    pub point_path: &'static str,
    /// Requested extension name; empty selects the adaptive instance.
    pub name: String,
}

/// A source of injectable objects.
///
/// Extension point: registered sources are chained by the adaptive
/// [`AggregateObjectFactory`] in registration order; the first source that
/// produces a value wins.
pub trait ObjectFactory: Extension {
    /// Returns the requested dependency as a boxed [`Shared`] cell, or
    /// `None` when this source cannot provide it.
    fn find(&self, request: &DependencyRequest) -> Option<Box<dyn Any + Send + Sync>>;
}

impl ExtensionPoint for dyn ObjectFactory {
    const NAME: &'static str = "ObjectFactory";
    const QUALIFIED: &'static str = concat!(module_path!(), "::", "ObjectFactory");

    fn lifecycle_of(instance: &Self) -> Option<&dyn Lifecycle> {
        instance.lifecycle()
    }
}

// =============================================================================
// Built-in sources
// =============================================================================

/// Resolves dependencies to the adaptive instance of their extension point.
#[derive(Default)]
pub struct SpiObjectFactory;

impl Extension for SpiObjectFactory {}

impl ObjectFactory for SpiObjectFactory {
    fn find(&self, request: &DependencyRequest) -> Option<Box<dyn Any + Send + Sync>> {
        if !request.name.is_empty() {
            return None;
        }
        registry::erased_adaptive(request.point)
    }
}

/// The hand-written adaptive object factory: chains every registered source.
pub struct AggregateObjectFactory {
    factories: Vec<Arc<dyn ObjectFactory>>,
}

impl AggregateObjectFactory {
    fn collect() -> Self {
        let registry = ExtensionRegistry::<dyn ObjectFactory>::global();
        let mut factories = Vec::new();
        for name in registry.supported_extensions() {
            match registry.get(&name) {
                Ok(factory) => factories.push(factory),
                Err(e) => warn!(
                    factory = %name,
                    error = %e,
                    "Skipping unavailable object factory"
                ),
            }
        }
        Self { factories }
    }
}

impl Extension for AggregateObjectFactory {}

impl ObjectFactory for AggregateObjectFactory {
    fn find(&self, request: &DependencyRequest) -> Option<Box<dyn Any + Send + Sync>> {
        self.factories.iter().find_map(|f| f.find(request))
    }
}

extension_class!(
    SPI_OBJECT_FACTORY,
    dyn ObjectFactory,
    "trellis_extension::inject::SpiObjectFactory",
    normal = |_inj| Ok(Box::new(SpiObjectFactory)),
);

extension_class!(
    AGGREGATE_OBJECT_FACTORY,
    dyn ObjectFactory,
    "trellis_extension::inject::AggregateObjectFactory",
    adaptive = |_inj| Ok(Box::new(AggregateObjectFactory::collect())),
);

descriptor_resource!(
    OBJECT_FACTORY_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "trellis_extension.inject.ObjectFactory",
    contents = include_str!(
        "../resources/META-INF/trellis/internal/trellis_extension.inject.ObjectFactory"
    ),
);

// =============================================================================
// ExtensionInjector
// =============================================================================

#[derive(Clone, Copy)]
enum InjectorMode {
    /// No-op injector used while bootstrapping the object-factory registry.
    Empty,
    /// Resolves through the adaptive object factory.
    Standard,
}

/// The dependency source handed to every extension constructor.
pub struct ExtensionInjector {
    mode: InjectorMode,
}

impl ExtensionInjector {
    pub(crate) const fn empty() -> Self {
        Self {
            mode: InjectorMode::Empty,
        }
    }

    pub(crate) const fn standard() -> Self {
        Self {
            mode: InjectorMode::Standard,
        }
    }

    fn aggregate(&self) -> Option<Arc<dyn ObjectFactory>> {
        if matches!(self.mode, InjectorMode::Empty) {
            return None;
        }
        static AGGREGATE: OnceLock<Option<Arc<dyn ObjectFactory>>> = OnceLock::new();
        AGGREGATE
            .get_or_init(|| {
                match ExtensionRegistry::<dyn ObjectFactory>::global().get_adaptive() {
                    Ok(factory) => Some(factory),
                    Err(e) => {
                        warn!(error = %e, "No object factory available; injection disabled");
                        None
                    }
                }
            })
            .clone()
    }

    /// Requests the adaptive instance of extension point `P`, consulting the
    /// object-factory chain. Returns `None` (after logging) when no source
    /// can provide it.
    pub fn adaptive_of<P: ?Sized + ExtensionPoint>(&self) -> Option<Arc<P>> {
        // Touching the registry publishes its erased accessor for the
        // `spi` source.
        let _ = ExtensionRegistry::<P>::global();
        let factory = self.aggregate()?;
        let request = DependencyRequest {
            point: TypeId::of::<P>(),
            point_path: P::QUALIFIED,
            name: String::new(),
        };
        match factory.find(&request) {
            Some(cell) => match cell.downcast::<Shared<P>>() {
                Ok(shared) => Some(shared.0),
                Err(_) => {
                    warn!(
                        point = P::QUALIFIED,
                        "Object factory produced a mismatched dependency type"
                    );
                    None
                }
            },
            None => None,
        }
    }

    /// Requests a named extension of point `P`. Unresolvable dependencies
    /// are logged and skipped.
    pub fn extension_of<P: ?Sized + ExtensionPoint>(&self, name: &str) -> Option<Arc<P>> {
        if matches!(self.mode, InjectorMode::Empty) {
            return None;
        }
        match ExtensionRegistry::<P>::global().get(name) {
            Ok(instance) => Some(instance),
            Err(e) => {
                warn!(
                    point = P::QUALIFIED,
                    extension = name,
                    error = %e,
                    "Dependency unavailable; skipping injection"
                );
                None
            }
        }
    }
}
