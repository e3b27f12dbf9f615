//! Registry behavior: lookup, defaults, singletons, wrappers, duplicates,
//! and programmatic registration.

use std::sync::Arc;

use trellis_extension::{
    descriptor_resource, extension_class, extension_point, Extension, ExtensionClass,
    ExtensionError, ExtensionRegistry,
};

// ─── A plain extension point with two implementations ────────────────────────

#[extension_point(default = "alpha")]
pub trait Gauge: Extension {
    fn value(&self) -> u64;
}

#[derive(Default)]
pub struct AlphaGauge;
impl Extension for AlphaGauge {}
impl Gauge for AlphaGauge {
    fn value(&self) -> u64 {
        1
    }
}

#[derive(Default)]
pub struct BetaGauge;
impl Extension for BetaGauge {}
impl Gauge for BetaGauge {
    fn value(&self) -> u64 {
        2
    }
}

extension_class!(
    ALPHA_GAUGE,
    dyn Gauge,
    "registry::AlphaGauge",
    normal = |_inj| Ok(Box::new(AlphaGauge)),
);
extension_class!(
    BETA_GAUGE,
    dyn Gauge,
    "registry::BetaGauge",
    normal = |_inj| Ok(Box::new(BetaGauge)),
);
descriptor_resource!(
    GAUGE_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "registry.Gauge",
    contents = "# built-in gauges\nalpha=registry::AlphaGauge\nbeta=registry::BetaGauge\n",
);

#[test]
fn true_aliases_the_default_extension() {
    let registry = ExtensionRegistry::<dyn Gauge>::global();
    let by_alias = registry.get("true").unwrap();
    let by_name = registry.get("alpha").unwrap();
    assert!(Arc::ptr_eq(&by_alias, &by_name));
    assert_eq!(by_alias.value(), 1);
}

#[test]
fn names_resolve_to_distinct_singletons() {
    let registry = ExtensionRegistry::<dyn Gauge>::global();
    let alpha = registry.get("alpha").unwrap();
    let beta = registry.get("beta").unwrap();
    assert!(!Arc::ptr_eq(&alpha, &beta));
    assert_eq!(beta.value(), 2);
}

#[test]
fn successive_gets_return_the_identical_instance() {
    let registry = ExtensionRegistry::<dyn Gauge>::global();
    let first = registry.get("beta").unwrap();
    let second = registry.get("beta").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn supported_extensions_are_sorted_names() {
    let registry = ExtensionRegistry::<dyn Gauge>::global();
    let supported: Vec<String> = registry.supported_extensions().into_iter().collect();
    assert_eq!(supported, vec!["alpha".to_string(), "beta".to_string()]);
}

#[test]
fn unknown_names_fail_with_no_such_extension() {
    let registry = ExtensionRegistry::<dyn Gauge>::global();
    assert!(matches!(
        registry.get("missing"),
        Err(ExtensionError::NoSuchExtension { .. })
    ));
    assert!(matches!(registry.get(""), Err(ExtensionError::EmptyName)));
}

#[test]
fn get_or_default_falls_back() {
    let registry = ExtensionRegistry::<dyn Gauge>::global();
    let fallback = registry.get_or_default("nonexistent").unwrap();
    assert_eq!(fallback.value(), 1);
    let direct = registry.get_or_default("beta").unwrap();
    assert_eq!(direct.value(), 2);
}

#[test]
fn extension_name_inverts_get() {
    let registry = ExtensionRegistry::<dyn Gauge>::global();
    let beta = registry.get("beta").unwrap();
    assert_eq!(registry.extension_name(&beta).as_deref(), Some("beta"));
}

// ─── Wrapper folding ─────────────────────────────────────────────────────────

#[extension_point(default = "base")]
pub trait Pipe: Extension {
    fn render(&self) -> String;
}

pub struct BasePipe;
impl Extension for BasePipe {}
impl Pipe for BasePipe {
    fn render(&self) -> String {
        "base".to_string()
    }
}

pub struct PlainPipe;
impl Extension for PlainPipe {}
impl Pipe for PlainPipe {
    fn render(&self) -> String {
        "plain".to_string()
    }
}

pub struct OuterWrap {
    inner: Arc<dyn Pipe>,
}
impl Extension for OuterWrap {}
impl Pipe for OuterWrap {
    fn render(&self) -> String {
        format!("outer({})", self.inner.render())
    }
}

pub struct InnerWrap {
    inner: Arc<dyn Pipe>,
}
impl Extension for InnerWrap {}
impl Pipe for InnerWrap {
    fn render(&self) -> String {
        format!("inner({})", self.inner.render())
    }
}

extension_class!(
    BASE_PIPE,
    dyn Pipe,
    "registry::BasePipe",
    normal = |_inj| Ok(Box::new(BasePipe)),
);
extension_class!(
    PLAIN_PIPE,
    dyn Pipe,
    "registry::PlainPipe",
    normal = |_inj| Ok(Box::new(PlainPipe)),
);
extension_class!(
    OUTER_WRAP,
    dyn Pipe,
    "registry::OuterWrap",
    wrapper(order = 0, matches = &[], mismatches = &["plain"]) =
        |inner, _inj| Box::new(OuterWrap { inner }),
);
extension_class!(
    INNER_WRAP,
    dyn Pipe,
    "registry::InnerWrap",
    wrapper(order = 5, matches = &[], mismatches = &[]) =
        |inner, _inj| Box::new(InnerWrap { inner }),
);
descriptor_resource!(
    PIPE_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "registry.Pipe",
    contents = "base=registry::BasePipe\nplain=registry::PlainPipe\n\
                outer=registry::OuterWrap\ninner=registry::InnerWrap\n",
);

#[test]
fn wrappers_fold_with_lowest_order_outermost() {
    let registry = ExtensionRegistry::<dyn Pipe>::global();
    let wrapped = registry.get("base").unwrap();
    assert_eq!(wrapped.render(), "outer(inner(base))");
}

#[test]
fn wrapper_filters_exclude_mismatched_names() {
    let registry = ExtensionRegistry::<dyn Pipe>::global();
    let plain = registry.get("plain").unwrap();
    assert_eq!(plain.render(), "inner(plain)");
}

// ─── Duplicate names poison, overridable strategies replace ──────────────────

#[extension_point]
pub trait Dial: Extension {
    fn reading(&self) -> &'static str;
}

pub struct NorthDial;
impl Extension for NorthDial {}
impl Dial for NorthDial {
    fn reading(&self) -> &'static str {
        "north"
    }
}

pub struct SouthDial;
impl Extension for SouthDial {}
impl Dial for SouthDial {
    fn reading(&self) -> &'static str {
        "south"
    }
}

pub struct SpareDial;
impl Extension for SpareDial {}
impl Dial for SpareDial {
    fn reading(&self) -> &'static str {
        "spare"
    }
}

extension_class!(
    NORTH_DIAL,
    dyn Dial,
    "registry::NorthDial",
    normal = |_inj| Ok(Box::new(NorthDial)),
);
extension_class!(
    SOUTH_DIAL,
    dyn Dial,
    "registry::SouthDial",
    normal = |_inj| Ok(Box::new(SouthDial)),
);
extension_class!(
    SPARE_DIAL,
    dyn Dial,
    "registry::SpareDial",
    normal = |_inj| Ok(Box::new(SpareDial)),
);
// The internal strategy is not overridable: two classes claiming `needle`
// poison the name. `spare` keeps loading.
descriptor_resource!(
    DIAL_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "registry.Dial",
    contents = "needle=registry::NorthDial\nneedle=registry::SouthDial\n\
                spare=registry::SpareDial\n",
);

#[test]
fn duplicate_names_poison_only_themselves() {
    let registry = ExtensionRegistry::<dyn Dial>::global();
    let err = registry.get("needle").unwrap_err();
    match err {
        ExtensionError::NoSuchExtension { causes, .. } => {
            assert!(causes.contains("registry::NorthDial"));
            assert!(causes.contains("registry::SouthDial"));
        }
        other => panic!("expected NoSuchExtension, got {other}"),
    }
    assert!(!registry.has_extension("needle"));
    assert_eq!(registry.get("spare").unwrap().reading(), "spare");
}

#[extension_point]
pub trait Slot: Extension {
    fn origin(&self) -> &'static str;
}

pub struct FactorySlot;
impl Extension for FactorySlot {}
impl Slot for FactorySlot {
    fn origin(&self) -> &'static str {
        "factory"
    }
}

pub struct UserSlot;
impl Extension for UserSlot {}
impl Slot for UserSlot {
    fn origin(&self) -> &'static str {
        "user"
    }
}

extension_class!(
    FACTORY_SLOT,
    dyn Slot,
    "registry::FactorySlot",
    normal = |_inj| Ok(Box::new(FactorySlot)),
);
extension_class!(
    USER_SLOT,
    dyn Slot,
    "registry::UserSlot",
    normal = |_inj| Ok(Box::new(UserSlot)),
);
descriptor_resource!(
    SLOT_INTERNAL,
    directory = "META-INF/trellis/internal/",
    basename = "registry.Slot",
    contents = "main=registry::FactorySlot\n",
);
// The framework directory loads later and is overridable.
descriptor_resource!(
    SLOT_FRAMEWORK,
    directory = "META-INF/trellis/",
    basename = "registry.Slot",
    contents = "main=registry::UserSlot\n",
);

#[test]
fn overridable_strategies_replace_earlier_definitions() {
    let registry = ExtensionRegistry::<dyn Slot>::global();
    assert_eq!(registry.get("main").unwrap().origin(), "user");
}

// ─── Bare lines derive their name from the type path ─────────────────────────

#[extension_point]
pub trait Meter: Extension {
    fn unit(&self) -> &'static str;
}

pub struct NeedleMeter;
impl Extension for NeedleMeter {}
impl Meter for NeedleMeter {
    fn unit(&self) -> &'static str {
        "mm"
    }
}

extension_class!(
    NEEDLE_METER,
    dyn Meter,
    "registry::NeedleMeter",
    normal = |_inj| Ok(Box::new(NeedleMeter)),
);
descriptor_resource!(
    METER_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "registry.Meter",
    contents = "registry::NeedleMeter\n",
);

#[test]
fn bare_lines_use_the_derived_name() {
    let registry = ExtensionRegistry::<dyn Meter>::global();
    assert!(registry.has_extension("needle"));
    assert_eq!(registry.get("needle").unwrap().unit(), "mm");
}

// ─── Programmatic registration ───────────────────────────────────────────────

#[extension_point]
pub trait Knob: Extension {
    fn level(&self) -> u32;
}

pub struct LowKnob;
impl Extension for LowKnob {}
impl Knob for LowKnob {
    fn level(&self) -> u32 {
        1
    }
}

pub struct HighKnob;
impl Extension for HighKnob {}
impl Knob for HighKnob {
    fn level(&self) -> u32 {
        11
    }
}

#[test]
fn add_and_replace_extensions_at_runtime() {
    let registry = ExtensionRegistry::<dyn Knob>::global();

    registry
        .add_extension(
            "volume",
            ExtensionClass::normal("registry::LowKnob", |_inj| Ok(Box::new(LowKnob))),
        )
        .unwrap();
    assert_eq!(registry.get("volume").unwrap().level(), 1);

    // Re-registering the same name is refused.
    let duplicate = registry.add_extension(
        "volume",
        ExtensionClass::normal("registry::HighKnob", |_inj| Ok(Box::new(HighKnob))),
    );
    assert!(matches!(
        duplicate,
        Err(ExtensionError::DuplicateExtension { .. })
    ));

    // Replacement swaps the class and discards the cached instance.
    registry
        .replace_extension(
            "volume",
            ExtensionClass::normal("registry::HighKnob", |_inj| Ok(Box::new(HighKnob))),
        )
        .unwrap();
    assert_eq!(registry.get("volume").unwrap().level(), 11);

    assert!(matches!(
        registry.replace_extension(
            "absent",
            ExtensionClass::normal("registry::LowKnob", |_inj| Ok(Box::new(LowKnob))),
        ),
        Err(ExtensionError::NotRegistered { .. })
    ));
}

// ─── Cyclic construction is detected ─────────────────────────────────────────

#[extension_point]
pub trait Loop: Extension {
    fn spin(&self) -> u32;
}

pub struct SelfLoop;
impl Extension for SelfLoop {}
impl Loop for SelfLoop {
    fn spin(&self) -> u32 {
        0
    }
}

extension_class!(
    SELF_LOOP,
    dyn Loop,
    "registry::SelfLoop",
    normal = |_inj| {
        // Resolving yourself during construction closes the cycle.
        ExtensionRegistry::<dyn Loop>::global().get("me")?;
        Ok(Box::new(SelfLoop))
    },
);
descriptor_resource!(
    LOOP_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "registry.Loop",
    contents = "me=registry::SelfLoop\n",
);

#[test]
fn re_entrant_resolution_fails_instead_of_deadlocking() {
    let registry = ExtensionRegistry::<dyn Loop>::global();
    let err = registry.get("me").unwrap_err();
    match err {
        ExtensionError::InstantiationFailed { reason, .. } => {
            assert!(reason.contains("re-entrant"), "unexpected reason: {reason}");
        }
        other => panic!("expected InstantiationFailed, got {other}"),
    }
}

// ─── Loaded extensions track materialization ─────────────────────────────────

#[extension_point]
pub trait Lamp: Extension {
    fn lit(&self) -> bool;
}

pub struct DeskLamp;
impl Extension for DeskLamp {}
impl Lamp for DeskLamp {
    fn lit(&self) -> bool {
        true
    }
}

extension_class!(
    DESK_LAMP,
    dyn Lamp,
    "registry::DeskLamp",
    normal = |_inj| Ok(Box::new(DeskLamp)),
);
descriptor_resource!(
    LAMP_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "registry.Lamp",
    contents = "desk=registry::DeskLamp\n",
);

#[test]
fn loaded_extensions_reflect_materialized_names_only() {
    let registry = ExtensionRegistry::<dyn Lamp>::global();
    assert!(registry.loaded_extensions().is_empty());
    assert!(registry.has_extension("desk"));
    assert!(registry.loaded_extensions().is_empty());
    registry.get("desk").unwrap();
    assert_eq!(registry.loaded_extensions(), vec!["desk".to_string()]);
}
