//! Registration macros for provider crates.
//!
//! [`extension_class!`] contributes one implementation class to the
//! process-wide catalog; [`descriptor_resource!`] embeds a descriptor file.
//! Both expand to linkme distributed-slice statics, so registration happens
//! at link time with no init-order concerns.

/// Contributes an implementation class to the class catalog.
///
/// Forms:
///
/// ```rust,ignore
/// // A normal extension.
/// extension_class!(
///     RANDOM_BALANCE,
///     dyn LoadBalance,
///     "trellis_cluster::balance::RandomBalance",
///     normal = |_inj| Ok(Box::new(RandomBalance::default())),
/// );
///
/// // A normal extension with activation metadata.
/// extension_class!(
///     CACHE_FILTER,
///     dyn Filter,
///     "my_crate::CacheFilter",
///     normal = |_inj| Ok(Box::new(CacheFilter::new())),
///     activate(groups = &["provider"], keys = &["cache"], order = 10),
/// );
///
/// // A wrapper; lower order sits further out in the folded chain.
/// extension_class!(
///     METER_WRAPPER,
///     dyn Protocol,
///     "my_crate::MeterWrapper",
///     wrapper(order = 0, matches = &[], mismatches = &["injvm"]) =
///         |inner, _inj| Box::new(MeterWrapper::new(inner)),
/// );
///
/// // A hand-written adaptive implementation.
/// extension_class!(
///     MY_ADAPTIVE,
///     dyn Protocol,
///     "my_crate::MyAdaptiveProtocol",
///     adaptive = |_inj| Ok(Box::new(MyAdaptiveProtocol)),
/// );
/// ```
///
/// The type path is matched verbatim against descriptor lines; keep it equal
/// to the type's real `module::path::Name`.
#[macro_export]
macro_rules! extension_class {
    ($static_name:ident, $point:ty, $path:expr, normal = $ctor:expr $(,)?) => {
        #[$crate::linkme::distributed_slice($crate::EXTENSION_CLASSES)]
        #[linkme(crate = $crate::linkme)]
        static $static_name: $crate::ClassRecord = $crate::ClassRecord {
            type_path: $path,
            point: || ::std::any::TypeId::of::<$point>(),
            class: || {
                ::std::boxed::Box::new($crate::ExtensionClass::<$point>::normal($path, $ctor))
            },
        };
    };
    ($static_name:ident, $point:ty, $path:expr, normal = $ctor:expr,
     activate(groups = $groups:expr, keys = $keys:expr, order = $order:expr) $(,)?) => {
        #[$crate::linkme::distributed_slice($crate::EXTENSION_CLASSES)]
        #[linkme(crate = $crate::linkme)]
        static $static_name: $crate::ClassRecord = $crate::ClassRecord {
            type_path: $path,
            point: || ::std::any::TypeId::of::<$point>(),
            class: || {
                ::std::boxed::Box::new(
                    $crate::ExtensionClass::<$point>::normal($path, $ctor)
                        .with_activate($groups, $keys, $order),
                )
            },
        };
    };
    ($static_name:ident, $point:ty, $path:expr,
     wrapper(order = $order:expr, matches = $matches:expr, mismatches = $mismatches:expr) =
        $wrap:expr $(,)?) => {
        #[$crate::linkme::distributed_slice($crate::EXTENSION_CLASSES)]
        #[linkme(crate = $crate::linkme)]
        static $static_name: $crate::ClassRecord = $crate::ClassRecord {
            type_path: $path,
            point: || ::std::any::TypeId::of::<$point>(),
            class: || {
                ::std::boxed::Box::new($crate::ExtensionClass::<$point>::wrapper(
                    $path,
                    $wrap,
                    $order,
                    $matches,
                    $mismatches,
                ))
            },
        };
    };
    ($static_name:ident, $point:ty, $path:expr, adaptive = $ctor:expr $(,)?) => {
        #[$crate::linkme::distributed_slice($crate::EXTENSION_CLASSES)]
        #[linkme(crate = $crate::linkme)]
        static $static_name: $crate::ClassRecord = $crate::ClassRecord {
            type_path: $path,
            point: || ::std::any::TypeId::of::<$point>(),
            class: || {
                ::std::boxed::Box::new($crate::ExtensionClass::<$point>::adaptive($path, $ctor))
            },
        };
    };
}

/// Embeds a descriptor file into the binary.
///
/// ```rust,ignore
/// descriptor_resource!(
///     LOAD_BALANCE_DESCRIPTOR,
///     directory = "META-INF/trellis/internal/",
///     basename = "trellis_cluster.balance.LoadBalance",
///     contents = include_str!(
///         "../resources/META-INF/trellis/internal/trellis_cluster.balance.LoadBalance"
///     ),
/// );
/// ```
#[macro_export]
macro_rules! descriptor_resource {
    ($static_name:ident, directory = $dir:expr, basename = $base:expr,
     contents = $contents:expr $(,)?) => {
        #[$crate::linkme::distributed_slice($crate::DESCRIPTOR_RESOURCES)]
        #[linkme(crate = $crate::linkme)]
        static $static_name: $crate::DescriptorResource = $crate::DescriptorResource {
            directory: $dir,
            basename: $base,
            contents: $contents,
        };
    };
}
