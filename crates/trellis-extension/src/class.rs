//! Extension classes and the process-wide class catalog.
//!
//! A [`ClassRecord`] is the Rust stand-in for a class on the classpath:
//! provider crates contribute records (and descriptor resources naming them)
//! through linkme distributed slices, exactly the way transport crates
//! contribute capability functions in the capability-registry pattern. The
//! descriptor loader then resolves `name=type::path` lines against this
//! catalog.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use linkme::distributed_slice;
use parking_lot::RwLock;

use crate::error::ExtensionError;
use crate::inject::ExtensionInjector;
use crate::point::ExtensionPoint;

/// Constructor of a normal or adaptive extension instance.
///
/// The injector is the explicit replacement for reflective setter injection:
/// constructors pull their declared dependencies from it and skip the ones
/// that are absent.
pub type Constructor<T> = fn(&ExtensionInjector) -> Result<Box<T>, ExtensionError>;

/// Constructor of a wrapper: receives the instance it decorates.
pub type WrapperConstructor<T> = fn(Arc<T>, &ExtensionInjector) -> Box<T>;

/// Activation metadata attached to a normal extension.
#[derive(Debug, Clone)]
pub struct ActivateInfo {
    /// Groups in which the extension auto-activates; empty matches any.
    pub groups: &'static [&'static str],
    /// URL keys gating activation, each `key` or `key:value`; empty always
    /// activates.
    pub keys: &'static [&'static str],
    /// Sort order among auto-activated extensions; lower runs earlier.
    pub order: i32,
}

/// The role a class plays within its extension point.
pub enum ExtensionRole<T: ?Sized> {
    /// A concrete implementation keyed by a name.
    Normal {
        /// Instance constructor.
        construct: Constructor<T>,
    },
    /// A hand-written dispatcher replacing the synthesized one.
    Adaptive {
        /// Instance constructor.
        construct: Constructor<T>,
    },
    /// A decorator folded around other instances.
    Wrapper {
        /// Decorator constructor.
        wrap: WrapperConstructor<T>,
        /// Chain position; lower order sits further out.
        order: i32,
        /// Names the wrapper applies to; empty admits every name.
        matches: &'static [&'static str],
        /// Names the wrapper never applies to.
        mismatches: &'static [&'static str],
    },
}

impl<T: ?Sized> Clone for ExtensionRole<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Normal { construct } => Self::Normal {
                construct: *construct,
            },
            Self::Adaptive { construct } => Self::Adaptive {
                construct: *construct,
            },
            Self::Wrapper {
                wrap,
                order,
                matches,
                mismatches,
            } => Self::Wrapper {
                wrap: *wrap,
                order: *order,
                matches,
                mismatches,
            },
        }
    }
}

/// One registered implementation class of an extension point.
pub struct ExtensionClass<T: ?Sized> {
    type_path: &'static str,
    role: ExtensionRole<T>,
    activate: Option<ActivateInfo>,
}

impl<T: ?Sized> Clone for ExtensionClass<T> {
    fn clone(&self) -> Self {
        Self {
            type_path: self.type_path,
            role: self.role.clone(),
            activate: self.activate.clone(),
        }
    }
}

impl<T: ?Sized> ExtensionClass<T> {
    /// A normal implementation.
    pub const fn normal(type_path: &'static str, construct: Constructor<T>) -> Self {
        Self {
            type_path,
            role: ExtensionRole::Normal { construct },
            activate: None,
        }
    }

    /// A hand-written adaptive dispatcher.
    pub const fn adaptive(type_path: &'static str, construct: Constructor<T>) -> Self {
        Self {
            type_path,
            role: ExtensionRole::Adaptive { construct },
            activate: None,
        }
    }

    /// A wrapper. Lower `order` values sit further out in the folded chain.
    pub const fn wrapper(
        type_path: &'static str,
        wrap: WrapperConstructor<T>,
        order: i32,
        matches: &'static [&'static str],
        mismatches: &'static [&'static str],
    ) -> Self {
        Self {
            type_path,
            role: ExtensionRole::Wrapper {
                wrap,
                order,
                matches,
                mismatches,
            },
            activate: None,
        }
    }

    /// Attaches activation metadata (normal classes only).
    pub const fn with_activate(
        mut self,
        groups: &'static [&'static str],
        keys: &'static [&'static str],
        order: i32,
    ) -> Self {
        self.activate = Some(ActivateInfo {
            groups,
            keys,
            order,
        });
        self
    }

    /// The class's unique type path.
    pub fn type_path(&self) -> &'static str {
        self.type_path
    }

    /// The class's role.
    pub fn role(&self) -> &ExtensionRole<T> {
        &self.role
    }

    /// The activation metadata, if any.
    pub fn activate(&self) -> Option<&ActivateInfo> {
        self.activate.as_ref()
    }

    /// Whether this class carries the adaptive role.
    pub(crate) fn is_adaptive(&self) -> bool {
        matches!(self.role, ExtensionRole::Adaptive { .. })
    }

    /// Whether this class is a wrapper.
    pub(crate) fn is_wrapper(&self) -> bool {
        matches!(self.role, ExtensionRole::Wrapper { .. })
    }

    /// The instance constructor for normal and adaptive roles.
    pub(crate) fn constructor(&self) -> Option<Constructor<T>> {
        match &self.role {
            ExtensionRole::Normal { construct } | ExtensionRole::Adaptive { construct } => {
                Some(*construct)
            }
            ExtensionRole::Wrapper { .. } => None,
        }
    }

    /// Whether this wrapper admits `name` per its filters.
    pub(crate) fn admits(&self, name: &str) -> bool {
        match &self.role {
            ExtensionRole::Wrapper {
                matches,
                mismatches,
                ..
            } => {
                (matches.is_empty() || matches.contains(&name)) && !mismatches.contains(&name)
            }
            _ => false,
        }
    }

    /// The wrapper's chain position.
    pub(crate) fn wrapper_order(&self) -> i32 {
        match &self.role {
            ExtensionRole::Wrapper { order, .. } => *order,
            _ => 0,
        }
    }
}

// =============================================================================
// The built-in class catalog (linkme distributed slices)
// =============================================================================

/// One class made available for descriptor resolution.
///
/// `class` builds the typed [`ExtensionClass`], erased so records of every
/// extension point share one slice; the loader downcasts after checking
/// `point`.
pub struct ClassRecord {
    /// Unique type path, matched against descriptor lines.
    pub type_path: &'static str,
    /// `TypeId` of the extension point object type this class implements.
    pub point: fn() -> TypeId,
    /// Builds the erased [`ExtensionClass`].
    pub class: fn() -> Box<dyn Any + Send + Sync>,
}

/// Registry of implementation classes contributed by provider crates.
#[distributed_slice]
pub static EXTENSION_CLASSES: [ClassRecord];

/// A descriptor file compiled into a provider crate.
pub struct DescriptorResource {
    /// Directory prefix the file lives under, e.g. `META-INF/trellis/internal/`.
    pub directory: &'static str,
    /// File basename: the point's dotted qualified id.
    pub basename: &'static str,
    /// UTF-8 file contents.
    pub contents: &'static str,
}

/// Registry of embedded descriptor files.
#[distributed_slice]
pub static DESCRIPTOR_RESOURCES: [DescriptorResource];

// =============================================================================
// Runtime-registered classes
// =============================================================================

struct DynamicRecord {
    type_path: String,
    point: TypeId,
    build: Box<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>,
}

fn dynamic_classes() -> &'static RwLock<Vec<DynamicRecord>> {
    static DYNAMIC: OnceLock<RwLock<Vec<DynamicRecord>>> = OnceLock::new();
    DYNAMIC.get_or_init(|| RwLock::new(Vec::new()))
}

/// Registers an implementation class at runtime, making its type path
/// resolvable from descriptor files on disk.
pub fn register_class<T: ?Sized + ExtensionPoint>(class: ExtensionClass<T>) {
    dynamic_classes().write().push(DynamicRecord {
        type_path: class.type_path().to_string(),
        point: TypeId::of::<T>(),
        build: Box::new(move || Box::new(class.clone())),
    });
}

/// Resolves a type path against the catalog.
///
/// `prefer_builtin` controls whether linkme-contributed records shadow
/// runtime registrations or the other way around.
pub(crate) fn resolve_class<T: ?Sized + ExtensionPoint>(
    type_path: &str,
    prefer_builtin: bool,
) -> Result<ExtensionClass<T>, String> {
    let builtin = || {
        EXTENSION_CLASSES
            .iter()
            .find(|r| r.type_path == type_path)
            .map(|r| ((r.point)(), (r.class)()))
    };
    let dynamic = || {
        dynamic_classes()
            .read()
            .iter()
            .find(|r| r.type_path == type_path)
            .map(|r| (r.point, (r.build)()))
    };

    let found = if prefer_builtin {
        builtin().or_else(dynamic)
    } else {
        dynamic().or_else(builtin)
    };

    let Some((point, erased)) = found else {
        return Err(format!("type `{type_path}` is not in the class catalog"));
    };
    if point != TypeId::of::<T>() {
        return Err(format!(
            "type `{type_path}` does not implement extension point `{}`",
            T::QUALIFIED
        ));
    }
    erased
        .downcast::<ExtensionClass<T>>()
        .map(|c| *c)
        .map_err(|_| {
            format!(
                "type `{type_path}` registered a mismatched class for point `{}`",
                T::QUALIFIED
            )
        })
}

// =============================================================================
// Per-point class table
// =============================================================================

/// Everything the loader discovered for one extension point.
pub(crate) struct ClassTable<T: ?Sized> {
    /// Normal classes by name.
    pub classes: HashMap<String, ExtensionClass<T>>,
    /// Inverse map: type path → first registered name.
    pub names: HashMap<&'static str, String>,
    /// Activation descriptors by name.
    pub activates: BTreeMap<String, ActivateInfo>,
    /// Wrapper classes, discovery order.
    pub wrappers: Vec<ExtensionClass<T>>,
    /// The declared adaptive class, if any.
    pub adaptive: Option<ExtensionClass<T>>,
    /// Per-line load errors: offending line or name → rendered error.
    pub exceptions: BTreeMap<String, String>,
    /// Names disabled by duplicate registrations.
    pub poisoned: HashSet<String>,
    /// The point's default name.
    pub default_name: Option<String>,
}

impl<T: ?Sized> ClassTable<T> {
    pub(crate) fn new(default_name: Option<String>) -> Self {
        Self {
            classes: HashMap::new(),
            names: HashMap::new(),
            activates: BTreeMap::new(),
            wrappers: Vec::new(),
            adaptive: None,
            exceptions: BTreeMap::new(),
            poisoned: HashSet::new(),
            default_name,
        }
    }

    /// Renders the load errors whose key starts with `name`
    /// (case-insensitive), for attachment to `NoSuchExtension`.
    pub(crate) fn causes_for(&self, name: &str) -> String {
        let lowered = name.to_lowercase();
        let matched: Vec<&str> = self
            .exceptions
            .iter()
            .filter(|(k, _)| k.to_lowercase().starts_with(&lowered))
            .map(|(_, v)| v.as_str())
            .collect();
        if matched.is_empty() {
            String::new()
        } else {
            format!(", possible causes: {}", matched.join("; "))
        }
    }
}
