//! The per-point extension registry and the process-wide registry directory.
//!
//! One [`ExtensionRegistry`] exists per extension point type, reached through
//! [`ExtensionRegistry::global`]. Classes are discovered on the registry's
//! first use; instances are created on first request by name behind per-name
//! [`Holder`]s, so the only blocking points are the one-shot descriptor load
//! and per-name construction.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use trellis_core::constants::{DEFAULT_KEY, REMOVE_VALUE_PREFIX, TRUE_VALUE};
use trellis_core::Url;

use crate::class::{ActivateInfo, ClassTable, ExtensionClass, ExtensionRole};
use crate::error::{ExtensionError, ExtensionResult};
use crate::holder::Holder;
use crate::inject::ExtensionInjector;
use crate::loader;
use crate::point::ExtensionPoint;

/// Type-erased carrier for a shared extension instance.
///
/// `Arc<T>` with an unsized `T` cannot be stored as `Arc<dyn Any>` directly,
/// so caches and object factories pass instances boxed inside this sized
/// cell and downcast to `Shared<T>`.
pub struct Shared<T: ?Sized>(pub Arc<T>);

// =============================================================================
// Process-wide state
// =============================================================================

/// The process-wide class-path → instance cache backing invariant "one
/// singleton per class".
fn instance_cache() -> &'static Mutex<HashMap<String, Box<dyn Any + Send + Sync>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

struct DirectoryEntry {
    /// `Arc<ExtensionRegistry<T>>`, erased.
    registry: Box<dyn Any + Send + Sync>,
    /// Erased `get_adaptive`, used by the `spi` object factory.
    adaptive: Arc<dyn Fn() -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>,
    /// Erased `destroy`.
    destroy: Arc<dyn Fn() + Send + Sync>,
    point: &'static str,
}

fn directory() -> &'static Mutex<HashMap<TypeId, DirectoryEntry>> {
    static DIRECTORY: OnceLock<Mutex<HashMap<TypeId, DirectoryEntry>>> = OnceLock::new();
    DIRECTORY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Erased adaptive lookup for the `spi` object factory.
pub(crate) fn erased_adaptive(point: TypeId) -> Option<Box<dyn Any + Send + Sync>> {
    let f = directory()
        .lock()
        .get(&point)
        .map(|e| Arc::clone(&e.adaptive))?;
    f()
}

/// Tears down every registry: each materialized instance's
/// `Lifecycle::destroy` runs best-effort, then the process-wide instance
/// cache is emptied.
pub fn destroy_all() {
    let destroys: Vec<(&'static str, Arc<dyn Fn() + Send + Sync>)> = directory()
        .lock()
        .values()
        .map(|e| (e.point, Arc::clone(&e.destroy)))
        .collect();
    for (point, destroy) in destroys {
        debug!(point, "Destroying extension registry");
        destroy();
    }
    instance_cache().lock().clear();
    info!("All extension registries destroyed");
}

// =============================================================================
// Re-entrancy guard
// =============================================================================

thread_local! {
    static CONSTRUCTING: RefCell<HashSet<(TypeId, String)>> = RefCell::new(HashSet::new());
}

struct ConstructionGuard {
    key: (TypeId, String),
}

impl ConstructionGuard {
    /// Whether this thread is already constructing `(T, name)`. Checked
    /// before touching the per-name holder: the re-entrant caller would
    /// otherwise block on its own creation lock.
    fn in_progress<T: ?Sized + ExtensionPoint>(name: &str) -> bool {
        let key = (TypeId::of::<T>(), name.to_string());
        CONSTRUCTING.with(|c| c.borrow().contains(&key))
    }

    fn enter<T: ?Sized + ExtensionPoint>(name: &str) -> ExtensionResult<Self> {
        let key = (TypeId::of::<T>(), name.to_string());
        let fresh = CONSTRUCTING.with(|c| c.borrow_mut().insert(key.clone()));
        if fresh {
            Ok(Self { key })
        } else {
            Err(ExtensionError::CyclicExtension {
                point: T::QUALIFIED,
                name: name.to_string(),
            })
        }
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|c| {
            c.borrow_mut().remove(&self.key);
        });
    }
}

// =============================================================================
// ExtensionRegistry
// =============================================================================

/// A name-indexed, lazily-loaded, wrapper-chained container of one extension
/// point's implementations.
pub struct ExtensionRegistry<T: ?Sized + ExtensionPoint> {
    /// Memoized class-table load; errors are re-raised on every access.
    classes: RwLock<Option<Result<ClassTable<T>, ExtensionError>>>,
    /// Per-name instance holders.
    instances: Mutex<HashMap<String, Arc<Holder<Arc<T>>>>>,
    /// Memoized adaptive instance, success or failure.
    adaptive: Holder<Result<Arc<T>, ExtensionError>>,
    /// Dependency source handed to every constructor.
    injector: ExtensionInjector,
    /// Back-reference for adaptive synthesis.
    self_ref: OnceLock<Weak<Self>>,
}

impl<T: ?Sized + ExtensionPoint> ExtensionRegistry<T> {
    fn new() -> Self {
        let injector = if TypeId::of::<T>() == TypeId::of::<dyn crate::inject::ObjectFactory>() {
            ExtensionInjector::empty()
        } else {
            ExtensionInjector::standard()
        };
        Self {
            classes: RwLock::new(None),
            instances: Mutex::new(HashMap::new()),
            adaptive: Holder::new(),
            injector,
            self_ref: OnceLock::new(),
        }
    }

    /// The process-wide registry for `T`. Exactly one exists per point.
    pub fn global() -> Arc<Self> {
        let mut dir = directory().lock();
        if let Some(entry) = dir.get(&TypeId::of::<T>()) {
            if let Some(existing) = entry.registry.downcast_ref::<Arc<Self>>() {
                return Arc::clone(existing);
            }
        }
        let registry = Arc::new(Self::new());
        let _ = registry.self_ref.set(Arc::downgrade(&registry));
        let adaptive = {
            let r = Arc::clone(&registry);
            Arc::new(move || {
                r.get_adaptive()
                    .ok()
                    .map(|a| Box::new(Shared(a)) as Box<dyn Any + Send + Sync>)
            })
        };
        let destroy = {
            let r = Arc::clone(&registry);
            Arc::new(move || r.destroy())
        };
        dir.insert(
            TypeId::of::<T>(),
            DirectoryEntry {
                registry: Box::new(Arc::clone(&registry)),
                adaptive,
                destroy,
                point: T::QUALIFIED,
            },
        );
        debug!(point = T::QUALIFIED, "Created extension registry");
        registry
    }

    // ─── Class-table access ──────────────────────────────────────────────────

    fn with_classes<R>(&self, f: impl FnOnce(&ClassTable<T>) -> R) -> ExtensionResult<R> {
        {
            let guard = self.classes.read();
            if let Some(result) = guard.as_ref() {
                return match result {
                    Ok(table) => Ok(f(table)),
                    Err(e) => Err(e.clone()),
                };
            }
        }
        let mut guard = self.classes.write();
        let result = guard.get_or_insert_with(loader::load_class_table::<T>);
        match result {
            Ok(table) => Ok(f(table)),
            Err(e) => Err(e.clone()),
        }
    }

    fn with_classes_mut<R>(
        &self,
        f: impl FnOnce(&mut ClassTable<T>) -> ExtensionResult<R>,
    ) -> ExtensionResult<R> {
        let mut guard = self.classes.write();
        let result = guard.get_or_insert_with(loader::load_class_table::<T>);
        match result {
            Ok(table) => f(table),
            Err(e) => Err(e.clone()),
        }
    }

    // ─── Selection ───────────────────────────────────────────────────────────

    /// Returns the extension registered under `name`, constructing it on
    /// first use.
    ///
    /// `"true"` is a reserved alias for the default name: an extension
    /// literally registered as `true` is unreachable through it.
    pub fn get(&self, name: &str) -> ExtensionResult<Arc<T>> {
        if name.is_empty() {
            return Err(ExtensionError::EmptyName);
        }
        if name == TRUE_VALUE {
            return self.get_default();
        }
        if ConstructionGuard::in_progress::<T>(name) {
            return Err(ExtensionError::CyclicExtension {
                point: T::QUALIFIED,
                name: name.to_string(),
            });
        }
        let holder = self.holder_of(name);
        if let Some(instance) = holder.get() {
            return Ok(instance);
        }
        let _guard = ConstructionGuard::enter::<T>(name)?;
        holder.get_or_try_init(|| self.create(name))
    }

    /// Returns the point's declared default extension.
    pub fn get_default(&self) -> ExtensionResult<Arc<T>> {
        match self.with_classes(|t| t.default_name.clone())? {
            Some(name) => self.get(&name),
            None => Err(ExtensionError::NoDefault {
                point: T::QUALIFIED,
            }),
        }
    }

    /// `get(name)` when registered, the default otherwise.
    pub fn get_or_default(&self, name: &str) -> ExtensionResult<Arc<T>> {
        if self.has_extension(name) {
            self.get(name)
        } else {
            self.get_default()
        }
    }

    /// The declared default name, if any.
    pub fn default_extension_name(&self) -> Option<String> {
        self.with_classes(|t| t.default_name.clone()).ok().flatten()
    }

    /// Whether `name` is registered.
    pub fn has_extension(&self, name: &str) -> bool {
        !name.is_empty()
            && self
                .with_classes(|t| t.classes.contains_key(name))
                .unwrap_or(false)
    }

    /// All registered names, sorted.
    pub fn supported_extensions(&self) -> BTreeSet<String> {
        self.with_classes(|t| t.classes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Names whose instances have been materialized, sorted.
    pub fn loaded_extensions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .lock()
            .iter()
            .filter(|(_, holder)| holder.get().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// The name an instance was materialized under, by identity.
    pub fn extension_name(&self, instance: &Arc<T>) -> Option<String> {
        self.instances
            .lock()
            .iter()
            .find(|(_, holder)| {
                holder
                    .get()
                    .is_some_and(|held| Arc::ptr_eq(&held, instance))
            })
            .map(|(name, _)| name.clone())
    }

    // ─── Construction ────────────────────────────────────────────────────────

    fn holder_of(&self, name: &str) -> Arc<Holder<Arc<T>>> {
        Arc::clone(
            self.instances
                .lock()
                .entry(name.to_string())
                .or_default(),
        )
    }

    fn create(&self, name: &str) -> ExtensionResult<Arc<T>> {
        let (class, wrappers) = self.with_classes(|t| {
            (t.classes.get(name).cloned(), t.wrappers.clone())
        })?;
        let Some(class) = class else {
            let causes = self.with_classes(|t| t.causes_for(name))?;
            return Err(ExtensionError::NoSuchExtension {
                point: T::QUALIFIED,
                name: name.to_string(),
                causes,
            });
        };

        let mut instance = self.shared_instance(name, &class)?;

        // Admitted wrappers, sorted by order; applied highest-order first so
        // the lowest order ends up outermost.
        let mut admitted: Vec<ExtensionClass<T>> = wrappers
            .into_iter()
            .filter(|w| w.admits(name))
            .collect();
        admitted.sort_by_key(|w| (w.wrapper_order(), w.type_path()));
        for wrapper in admitted.into_iter().rev() {
            let ExtensionRole::Wrapper { wrap, .. } = wrapper.role() else {
                continue;
            };
            debug!(
                point = T::QUALIFIED,
                extension = name,
                wrapper = wrapper.type_path(),
                "Folding wrapper"
            );
            instance = Arc::from(wrap(instance, &self.injector));
        }

        if let Some(lifecycle) = T::lifecycle_of(instance.as_ref()) {
            lifecycle
                .initialize()
                .map_err(|e| ExtensionError::LifecycleFailed {
                    point: T::QUALIFIED,
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
        }

        debug!(point = T::QUALIFIED, extension = name, "Created extension");
        Ok(instance)
    }

    /// Returns the process-wide singleton for the class, constructing it when
    /// absent. The first published instance wins a construction race.
    fn shared_instance(
        &self,
        name: &str,
        class: &ExtensionClass<T>,
    ) -> ExtensionResult<Arc<T>> {
        let key = class.type_path();
        if let Some(existing) = lookup_shared::<T>(key) {
            return Ok(existing);
        }
        let construct = class.constructor().ok_or_else(|| {
            ExtensionError::InstantiationFailed {
                point: T::QUALIFIED,
                name: name.to_string(),
                reason: "wrapper classes cannot be instantiated directly".to_string(),
            }
        })?;
        let boxed = construct(&self.injector).map_err(|e| {
            ExtensionError::InstantiationFailed {
                point: T::QUALIFIED,
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        let instance: Arc<T> = Arc::from(boxed);

        let mut cache = instance_cache().lock();
        if let Some(winner) = cache
            .get(key)
            .and_then(|cell| cell.downcast_ref::<Shared<T>>())
        {
            return Ok(Arc::clone(&winner.0));
        }
        cache.insert(key.to_string(), Box::new(Shared(Arc::clone(&instance))));
        Ok(instance)
    }

    // ─── Adaptive ────────────────────────────────────────────────────────────

    /// Returns the point's adaptive instance: the declared adaptive class
    /// when one exists, the synthesized dispatcher otherwise. Success and
    /// failure are both memoized.
    pub fn get_adaptive(&self) -> ExtensionResult<Arc<T>> {
        self.adaptive.get_or_init(|| self.create_adaptive())
    }

    fn create_adaptive(&self) -> ExtensionResult<Arc<T>> {
        let declared = self.with_classes(|t| t.adaptive.clone())?;
        if let Some(class) = declared {
            let construct = class.constructor().ok_or_else(|| {
                ExtensionError::AdaptiveSynthesisFailed {
                    point: T::QUALIFIED,
                    reason: "declared adaptive class has no constructor".to_string(),
                }
            })?;
            let boxed = construct(&self.injector).map_err(|e| {
                ExtensionError::InstantiationFailed {
                    point: T::QUALIFIED,
                    name: "adaptive".to_string(),
                    reason: e.to_string(),
                }
            })?;
            debug!(
                point = T::QUALIFIED,
                class = class.type_path(),
                "Using declared adaptive implementation"
            );
            return Ok(Arc::from(boxed));
        }

        let registry = self
            .self_ref
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ExtensionError::AdaptiveSynthesisFailed {
                point: T::QUALIFIED,
                reason: "registry is not globally registered".to_string(),
            })?;
        match T::synthesize_adaptive(&registry) {
            Some(dispatcher) => Ok(Arc::from(dispatcher)),
            None => Err(ExtensionError::AdaptiveSynthesisFailed {
                point: T::QUALIFIED,
                reason: "no adaptive implementation is declared and no method \
                         of the point is URL-addressable"
                    .to_string(),
            }),
        }
    }

    // ─── Programmatic registration ───────────────────────────────────────────

    /// Registers a class under `name` at runtime. Classes carrying the
    /// adaptive role install as the point's adaptive implementation.
    pub fn add_extension(&self, name: &str, class: ExtensionClass<T>) -> ExtensionResult<()> {
        self.with_classes_mut(|table| {
            if class.is_adaptive() {
                if let Some(existing) = table.adaptive.as_ref().map(|e| e.type_path()) {
                    return Err(ExtensionError::MultipleAdaptive {
                        point: T::QUALIFIED,
                        existing: existing.to_string(),
                        duplicate: class.type_path().to_string(),
                    });
                }
                table.adaptive = Some(class);
                return Ok(());
            }
            if class.is_wrapper() {
                table.wrappers.push(class);
                return Ok(());
            }
            if name.is_empty() {
                return Err(ExtensionError::EmptyName);
            }
            if let Some(existing) = table.classes.get(name).map(|e| e.type_path()) {
                return Err(ExtensionError::DuplicateExtension {
                    point: T::QUALIFIED,
                    name: name.to_string(),
                    existing: existing.to_string(),
                    duplicate: class.type_path().to_string(),
                });
            }
            if let Some(info) = class.activate() {
                table.activates.insert(name.to_string(), info.clone());
            }
            table
                .names
                .entry(class.type_path())
                .or_insert_with(|| name.to_string());
            table.classes.insert(name.to_string(), class);
            Ok(())
        })
    }

    /// Replaces a registered class, discarding any materialized instance of
    /// the old one.
    pub fn replace_extension(&self, name: &str, class: ExtensionClass<T>) -> ExtensionResult<()> {
        self.with_classes_mut(|table| {
            if class.is_adaptive() {
                if table.adaptive.is_none() {
                    return Err(ExtensionError::NotRegistered {
                        point: T::QUALIFIED,
                        name: "adaptive".to_string(),
                    });
                }
                table.adaptive = Some(class);
                return Ok(());
            }
            if !table.classes.contains_key(name) {
                return Err(ExtensionError::NotRegistered {
                    point: T::QUALIFIED,
                    name: name.to_string(),
                });
            }
            table
                .names
                .entry(class.type_path())
                .or_insert_with(|| name.to_string());
            table.classes.insert(name.to_string(), class);
            Ok(())
        })?;
        self.instances.lock().remove(name);
        self.adaptive.clear();
        Ok(())
    }

    // ─── Activation ──────────────────────────────────────────────────────────

    /// Builds the ordered activation list for `url`, the requested `names`,
    /// and `group` (see the activation protocol).
    ///
    /// The output never contains a name that was requested with a
    /// `-` prefix, nor the `default` sentinel itself.
    pub fn get_activate(
        &self,
        url: &Url,
        names: &[&str],
        group: &str,
    ) -> ExtensionResult<Vec<Arc<T>>> {
        let mut activated: Vec<Arc<T>> = Vec::new();
        let mut loaded: HashSet<String> = HashSet::new();

        let kill_switch = format!("{REMOVE_VALUE_PREFIX}{DEFAULT_KEY}");
        if !names.contains(&kill_switch.as_str()) {
            let mut candidates: Vec<(String, ActivateInfo)> =
                self.with_classes(|t| {
                    t.activates
                        .iter()
                        .map(|(n, i)| (n.clone(), i.clone()))
                        .collect()
                })?;
            candidates.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(&b.0)));

            for (name, info) in candidates {
                if !group_matches(group, info.groups) {
                    continue;
                }
                if names.contains(&name.as_str()) {
                    continue;
                }
                if names
                    .iter()
                    .any(|n| n.strip_prefix(REMOVE_VALUE_PREFIX) == Some(name.as_str()))
                {
                    continue;
                }
                if !is_active(&info, url) {
                    continue;
                }
                if loaded.contains(&name) {
                    continue;
                }
                activated.push(self.get(&name)?);
                loaded.insert(name);
            }
        }

        let mut requested: Vec<Arc<T>> = Vec::new();
        for &name in names {
            if name.starts_with(REMOVE_VALUE_PREFIX) {
                continue;
            }
            if names
                .iter()
                .any(|n| n.strip_prefix(REMOVE_VALUE_PREFIX) == Some(name))
            {
                continue;
            }
            if name == DEFAULT_KEY {
                if !requested.is_empty() {
                    let mut spliced: Vec<Arc<T>> = requested.drain(..).collect();
                    spliced.append(&mut activated);
                    activated = spliced;
                }
            } else {
                if loaded.contains(name) {
                    continue;
                }
                requested.push(self.get(name)?);
                loaded.insert(name.to_string());
            }
        }
        activated.append(&mut requested);
        Ok(activated)
    }

    /// [`get_activate`](Self::get_activate) over the comma-separated value of
    /// a URL parameter.
    pub fn get_activate_by_key(
        &self,
        url: &Url,
        key: &str,
        group: &str,
    ) -> ExtensionResult<Vec<Arc<T>>> {
        let value = url.parameter(key).unwrap_or("");
        let names: Vec<&str> = value
            .split(trellis_core::constants::COMMA_SEPARATOR)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();
        self.get_activate(url, &names, group)
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Destroys every materialized instance of this registry, best-effort.
    pub fn destroy(&self) {
        let holders: Vec<(String, Arc<Holder<Arc<T>>>)> = {
            let mut map = self.instances.lock();
            map.drain().collect()
        };
        for (name, holder) in holders {
            let Some(instance) = holder.get() else { continue };
            if let Some(lifecycle) = T::lifecycle_of(instance.as_ref()) {
                if let Err(e) = lifecycle.destroy() {
                    error!(
                        point = T::QUALIFIED,
                        extension = %name,
                        error = %e,
                        "Extension destroy hook failed"
                    );
                }
            }
        }
        if let Some(Ok(adaptive)) = self.adaptive.get() {
            if let Some(lifecycle) = T::lifecycle_of(adaptive.as_ref()) {
                if let Err(e) = lifecycle.destroy() {
                    warn!(point = T::QUALIFIED, error = %e, "Adaptive destroy hook failed");
                }
            }
        }
        self.adaptive.clear();
    }
}

/// Looks up the process-wide singleton for a type path.
fn lookup_shared<T: ?Sized + ExtensionPoint>(type_path: &str) -> Option<Arc<T>> {
    instance_cache()
        .lock()
        .get(type_path)
        .and_then(|cell| cell.downcast_ref::<Shared<T>>())
        .map(|shared| Arc::clone(&shared.0))
}

fn group_matches(group: &str, groups: &[&str]) -> bool {
    group.is_empty() || groups.contains(&group)
}

/// Whether the URL satisfies one of the activation keys: a parameter whose
/// key equals `k` or ends with `.k`, with a non-empty value, or the exact
/// value when the key carries a `k:value` constraint.
fn is_active(info: &ActivateInfo, url: &Url) -> bool {
    if info.keys.is_empty() {
        return true;
    }
    for spec in info.keys {
        let (key, constraint) = match spec.split_once(':') {
            Some((k, v)) => (k, Some(v)),
            None => (*spec, None),
        };
        for (param_key, param_value) in url.parameters() {
            if param_value.is_empty() {
                continue;
            }
            let key_matches =
                param_key == key || param_key.ends_with(&format!(".{key}"));
            if !key_matches {
                continue;
            }
            match constraint {
                Some(expected) => {
                    if param_value == expected {
                        return true;
                    }
                }
                None => return true,
            }
        }
    }
    false
}
