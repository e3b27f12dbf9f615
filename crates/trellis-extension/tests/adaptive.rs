//! Adaptive dispatch: URL-keyed selection through synthesized and
//! hand-written dispatchers.

use thiserror::Error;

use trellis_core::{Invocation, RpcInvocation, Url};
use trellis_extension::{
    descriptor_resource, extension_class, extension_point, Extension, ExtensionError,
    ExtensionRegistry,
};

fn url(query: &str) -> Url {
    format!("trpc://127.0.0.1:20880/svc?{query}").parse().unwrap()
}

// ─── A dispatchable point with two implementations ───────────────────────────

#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

#[extension_point(default = "plain")]
pub trait Formatter: Extension {
    #[adaptive("formatter")]
    fn format(&self, url: &Url, text: &str) -> Result<String, FormatError>;

    #[adaptive("formatter")]
    fn format_call(
        &self,
        url: &Url,
        invocation: &dyn Invocation,
        text: &str,
    ) -> Result<String, FormatError>;
}

pub struct PlainFormatter;
impl Extension for PlainFormatter {}
impl Formatter for PlainFormatter {
    fn format(&self, _url: &Url, text: &str) -> Result<String, FormatError> {
        Ok(text.to_string())
    }
    fn format_call(
        &self,
        url: &Url,
        _invocation: &dyn Invocation,
        text: &str,
    ) -> Result<String, FormatError> {
        self.format(url, text)
    }
}

pub struct ShoutFormatter;
impl Extension for ShoutFormatter {}
impl Formatter for ShoutFormatter {
    fn format(&self, _url: &Url, text: &str) -> Result<String, FormatError> {
        Ok(text.to_uppercase())
    }
    fn format_call(
        &self,
        url: &Url,
        _invocation: &dyn Invocation,
        text: &str,
    ) -> Result<String, FormatError> {
        self.format(url, text)
    }
}

extension_class!(
    PLAIN_FORMATTER,
    dyn Formatter,
    "adaptive::PlainFormatter",
    normal = |_inj| Ok(Box::new(PlainFormatter)),
);
extension_class!(
    SHOUT_FORMATTER,
    dyn Formatter,
    "adaptive::ShoutFormatter",
    normal = |_inj| Ok(Box::new(ShoutFormatter)),
);
descriptor_resource!(
    FORMATTER_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "adaptive.Formatter",
    contents = "plain=adaptive::PlainFormatter\nshout=adaptive::ShoutFormatter\n",
);

#[test]
fn dispatches_on_the_url_key() {
    let adaptive = ExtensionRegistry::<dyn Formatter>::global()
        .get_adaptive()
        .unwrap();
    let out = adaptive.format(&url("formatter=shout"), "hi").unwrap();
    assert_eq!(out, "HI");
}

#[test]
fn falls_back_to_the_declared_default() {
    let adaptive = ExtensionRegistry::<dyn Formatter>::global()
        .get_adaptive()
        .unwrap();
    let out = adaptive.format(&url("other=1"), "hi").unwrap();
    assert_eq!(out, "hi");
}

#[test]
fn resolved_class_matches_the_registry_entry() {
    let registry = ExtensionRegistry::<dyn Formatter>::global();
    let adaptive = registry.get_adaptive().unwrap();
    let direct = registry.get("shout").unwrap();
    let via_adaptive = adaptive.format(&url("formatter=shout"), "x").unwrap();
    assert_eq!(via_adaptive, direct.format(&url(""), "x").unwrap());
}

#[test]
fn invocation_attachments_override_the_url() {
    let adaptive = ExtensionRegistry::<dyn Formatter>::global()
        .get_adaptive()
        .unwrap();
    let invocation = RpcInvocation::new("say").with_attachment("formatter", "shout");
    let out = adaptive
        .format_call(&url("formatter=plain"), &invocation, "hi")
        .unwrap();
    assert_eq!(out, "HI");
}

#[test]
fn lookup_is_method_scoped_when_an_invocation_is_present() {
    let adaptive = ExtensionRegistry::<dyn Formatter>::global()
        .get_adaptive()
        .unwrap();
    let invocation = RpcInvocation::new("say");
    let out = adaptive
        .format_call(&url("formatter=plain&say.formatter=shout"), &invocation, "hi")
        .unwrap();
    assert_eq!(out, "HI");
}

#[test]
fn unknown_selection_surfaces_the_registry_error() {
    let adaptive = ExtensionRegistry::<dyn Formatter>::global()
        .get_adaptive()
        .unwrap();
    let err = adaptive.format(&url("formatter=nope"), "hi").unwrap_err();
    assert!(matches!(
        err,
        FormatError::Extension(ExtensionError::NoSuchExtension { .. })
    ));
}

// ─── No key, no default ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PickError {
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

#[extension_point]
pub trait Picker: Extension {
    #[adaptive("picker")]
    fn pick(&self, url: &Url) -> Result<String, PickError>;
}

pub struct AnyPicker;
impl Extension for AnyPicker {}
impl Picker for AnyPicker {
    fn pick(&self, _url: &Url) -> Result<String, PickError> {
        Ok("any".to_string())
    }
}

extension_class!(
    ANY_PICKER,
    dyn Picker,
    "adaptive::AnyPicker",
    normal = |_inj| Ok(Box::new(AnyPicker)),
);
descriptor_resource!(
    PICKER_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "adaptive.Picker",
    contents = "any=adaptive::AnyPicker\n",
);

#[test]
fn missing_key_without_default_is_an_error() {
    let adaptive = ExtensionRegistry::<dyn Picker>::global()
        .get_adaptive()
        .unwrap();
    assert!(matches!(
        adaptive.pick(&url("unrelated=1")).unwrap_err(),
        PickError::Extension(ExtensionError::MissingAdaptiveKey { .. })
    ));
    assert_eq!(adaptive.pick(&url("picker=any")).unwrap(), "any");
}

// ─── Synthesis failure is memoized ───────────────────────────────────────────

#[extension_point]
pub trait Opaque: Extension {
    fn id(&self) -> u32;
}

#[test]
fn unaddressable_points_fail_adaptive_resolution_repeatably() {
    let registry = ExtensionRegistry::<dyn Opaque>::global();
    let first = registry.get_adaptive().unwrap_err();
    assert!(matches!(
        first,
        ExtensionError::AdaptiveSynthesisFailed { .. }
    ));
    // The failure is memoized and re-raised, not recomputed.
    let second = registry.get_adaptive().unwrap_err();
    assert_eq!(first.to_string(), second.to_string());
}

// ─── A hand-written adaptive class replaces the synthesized one ──────────────

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

#[extension_point(default = "real")]
pub trait Router: Extension {
    #[adaptive("router")]
    fn route(&self, url: &Url) -> Result<&'static str, RouteError>;
}

pub struct RealRouter;
impl Extension for RealRouter {}
impl Router for RealRouter {
    fn route(&self, _url: &Url) -> Result<&'static str, RouteError> {
        Ok("real")
    }
}

pub struct PinnedRouter;
impl Extension for PinnedRouter {}
impl Router for PinnedRouter {
    fn route(&self, _url: &Url) -> Result<&'static str, RouteError> {
        Ok("pinned")
    }
}

extension_class!(
    REAL_ROUTER,
    dyn Router,
    "adaptive::RealRouter",
    normal = |_inj| Ok(Box::new(RealRouter)),
);
extension_class!(
    PINNED_ROUTER,
    dyn Router,
    "adaptive::PinnedRouter",
    adaptive = |_inj| Ok(Box::new(PinnedRouter)),
);
descriptor_resource!(
    ROUTER_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "adaptive.Router",
    contents = "real=adaptive::RealRouter\nadaptive=adaptive::PinnedRouter\n",
);

#[test]
fn declared_adaptive_class_wins_over_synthesis() {
    let adaptive = ExtensionRegistry::<dyn Router>::global()
        .get_adaptive()
        .unwrap();
    // The synthesized dispatcher would resolve `real`; the declared class
    // answers directly.
    assert_eq!(adaptive.route(&url("router=real")).unwrap(), "pinned");
}

// ─── Two adaptive declarations are fatal to the registry ─────────────────────

#[derive(Debug, Error)]
pub enum SplitError {
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

#[extension_point]
pub trait Split: Extension {
    #[adaptive("split")]
    fn side(&self, url: &Url) -> Result<&'static str, SplitError>;
}

pub struct LeftSplit;
impl Extension for LeftSplit {}
impl Split for LeftSplit {
    fn side(&self, _url: &Url) -> Result<&'static str, SplitError> {
        Ok("left")
    }
}

pub struct RightSplit;
impl Extension for RightSplit {}
impl Split for RightSplit {
    fn side(&self, _url: &Url) -> Result<&'static str, SplitError> {
        Ok("right")
    }
}

extension_class!(
    LEFT_SPLIT,
    dyn Split,
    "adaptive::LeftSplit",
    adaptive = |_inj| Ok(Box::new(LeftSplit)),
);
extension_class!(
    RIGHT_SPLIT,
    dyn Split,
    "adaptive::RightSplit",
    adaptive = |_inj| Ok(Box::new(RightSplit)),
);
descriptor_resource!(
    SPLIT_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "adaptive.Split",
    contents = "left=adaptive::LeftSplit\nright=adaptive::RightSplit\n",
);

#[test]
fn two_adaptive_declarations_poison_the_whole_registry() {
    let registry = ExtensionRegistry::<dyn Split>::global();
    assert!(matches!(
        registry.get_adaptive().unwrap_err(),
        ExtensionError::MultipleAdaptive { .. }
    ));
    // The class table itself is the failed unit, so plain lookups fail too.
    assert!(matches!(
        registry.get("left").unwrap_err(),
        ExtensionError::MultipleAdaptive { .. }
    ));
}

// ─── Methods without a URL parameter are unsupported ─────────────────────────

#[derive(Debug, Error)]
pub enum MixError {
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

#[extension_point(default = "only")]
pub trait Mixed: Extension {
    #[adaptive("mixed")]
    fn routed(&self, url: &Url) -> Result<&'static str, MixError>;

    fn unrouted(&self) -> Result<&'static str, MixError>;
}

pub struct OnlyMixed;
impl Extension for OnlyMixed {}
impl Mixed for OnlyMixed {
    fn routed(&self, _url: &Url) -> Result<&'static str, MixError> {
        Ok("routed")
    }
    fn unrouted(&self) -> Result<&'static str, MixError> {
        Ok("unrouted")
    }
}

extension_class!(
    ONLY_MIXED,
    dyn Mixed,
    "adaptive::OnlyMixed",
    normal = |_inj| Ok(Box::new(OnlyMixed)),
);
descriptor_resource!(
    MIXED_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "adaptive.Mixed",
    contents = "only=adaptive::OnlyMixed\n",
);

#[test]
fn methods_without_a_url_parameter_are_unsupported_on_the_dispatcher() {
    let adaptive = ExtensionRegistry::<dyn Mixed>::global()
        .get_adaptive()
        .unwrap();
    assert_eq!(adaptive.routed(&url("")).unwrap(), "routed");
    assert!(matches!(
        adaptive.unrouted().unwrap_err(),
        MixError::Extension(ExtensionError::UnsupportedOperation { .. })
    ));
    // The concrete implementation still answers normally.
    let direct = ExtensionRegistry::<dyn Mixed>::global().get("only").unwrap();
    assert_eq!(direct.unrouted().unwrap(), "unrouted");
}

// ─── Tagged parameters expose their URL through `url()` ──────────────────────

pub struct Exporter {
    url: Url,
}

impl Exporter {
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

#[extension_point(default = "noop")]
pub trait Probe: Extension {
    #[adaptive("probe")]
    fn inspect(&self, #[url] exporter: &Exporter) -> Result<&'static str, ProbeError>;
}

pub struct NoopProbe;
impl Extension for NoopProbe {}
impl Probe for NoopProbe {
    fn inspect(&self, _exporter: &Exporter) -> Result<&'static str, ProbeError> {
        Ok("noop")
    }
}

pub struct DeepProbe;
impl Extension for DeepProbe {}
impl Probe for DeepProbe {
    fn inspect(&self, _exporter: &Exporter) -> Result<&'static str, ProbeError> {
        Ok("deep")
    }
}

extension_class!(
    NOOP_PROBE,
    dyn Probe,
    "adaptive::NoopProbe",
    normal = |_inj| Ok(Box::new(NoopProbe)),
);
extension_class!(
    DEEP_PROBE,
    dyn Probe,
    "adaptive::DeepProbe",
    normal = |_inj| Ok(Box::new(DeepProbe)),
);
descriptor_resource!(
    PROBE_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "adaptive.Probe",
    contents = "noop=adaptive::NoopProbe\ndeep=adaptive::DeepProbe\n",
);

#[test]
fn url_tagged_parameters_supply_the_dispatch_url() {
    let adaptive = ExtensionRegistry::<dyn Probe>::global()
        .get_adaptive()
        .unwrap();
    let exporter = Exporter {
        url: url("probe=deep"),
    };
    assert_eq!(adaptive.inspect(&exporter).unwrap(), "deep");
    let plain = Exporter { url: url("") };
    assert_eq!(adaptive.inspect(&plain).unwrap(), "noop");
}
