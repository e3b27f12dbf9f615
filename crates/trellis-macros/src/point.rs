//! Implementation of the `#[extension_point]` attribute macro.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, ExprLit, FnArg, Ident, ItemTrait, Lit, Meta, Pat, PatIdent, PatType, Path, ReturnType,
    Token, TraitItem, TraitItemFn, Type,
};

/// Parsed attribute arguments.
struct PointArgs {
    default: Option<String>,
    adaptive: bool,
    crate_path: Path,
    core_path: Path,
}

impl PointArgs {
    fn parse(attr: TokenStream) -> syn::Result<Self> {
        let mut args = PointArgs {
            default: None,
            adaptive: true,
            crate_path: syn::parse_str("::trellis_extension")?,
            core_path: syn::parse_str("::trellis_core")?,
        };

        let metas =
            syn::parse::Parser::parse(Punctuated::<Meta, Token![,]>::parse_terminated, attr)?;
        for meta in metas {
            let Meta::NameValue(nv) = meta else {
                return Err(syn::Error::new(
                    meta.span(),
                    "expected `name = value` arguments",
                ));
            };
            let name = nv
                .path
                .get_ident()
                .map(Ident::to_string)
                .unwrap_or_default();
            match (name.as_str(), &nv.value) {
                (
                    "default",
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(s), ..
                    }),
                ) => args.default = Some(s.value()),
                (
                    "adaptive",
                    Expr::Lit(ExprLit {
                        lit: Lit::Bool(b), ..
                    }),
                ) => args.adaptive = b.value,
                ("crate_path", Expr::Path(p)) => args.crate_path = p.path.clone(),
                ("core_path", Expr::Path(p)) => args.core_path = p.path.clone(),
                _ => {
                    return Err(syn::Error::new(
                        nv.span(),
                        "expected `default = \"..\"`, `adaptive = bool`, \
                         `crate_path = path`, or `core_path = path`",
                    ));
                }
            }
        }
        Ok(args)
    }
}

/// How one trait method is rendered on the synthesized dispatcher.
struct MethodPlan {
    /// Signature with every parameter renamed to `__argN`.
    func: TraitItemFn,
    /// Expression yielding `&Url`, when the method is URL-addressable.
    url_expr: Option<proc_macro2::TokenStream>,
    /// Identifier of a `&dyn Invocation` parameter, if any.
    invocation: Option<Ident>,
    /// URL keys to consult, in order.
    keys: Vec<String>,
    /// Whether the method returns a `Result`.
    returns_result: bool,
    /// Argument identifiers to forward.
    forwarded: Vec<Ident>,
}

pub fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match PointArgs::parse(attr) {
        Ok(a) => a,
        Err(e) => return e.into_compile_error().into(),
    };
    let mut tr = syn::parse_macro_input!(item as ItemTrait);

    if !tr.generics.params.is_empty() {
        return syn::Error::new(
            tr.generics.span(),
            "extension point traits cannot be generic",
        )
        .into_compile_error()
        .into();
    }

    let derived_key = split_case(&tr.ident.to_string());
    let mut plans: Vec<MethodPlan> = Vec::new();

    for item in &mut tr.items {
        let TraitItem::Fn(func) = item else { continue };

        let explicit_keys = match take_adaptive_keys(func) {
            Ok(k) => k,
            Err(e) => return e.into_compile_error().into(),
        };
        let has_default_body = func.default.is_some();

        let mut plan = MethodPlan {
            func: func.clone(),
            url_expr: None,
            invocation: None,
            keys: explicit_keys.clone().unwrap_or_else(|| vec![derived_key.clone()]),
            returns_result: returns_result(&func.sig.output),
            forwarded: Vec::new(),
        };

        let mut takes_self_ref = false;
        for (index, input) in plan.func.sig.inputs.iter_mut().enumerate() {
            match input {
                FnArg::Receiver(r) => {
                    takes_self_ref = r.reference.is_some() && r.mutability.is_none();
                }
                FnArg::Typed(pt) => {
                    let ident = format_ident!("__arg{index}");
                    let tagged_url = take_url_tag(pt);
                    pt.pat = Box::new(Pat::Ident(PatIdent {
                        attrs: Vec::new(),
                        by_ref: None,
                        mutability: None,
                        ident: ident.clone(),
                        subpat: None,
                    }));
                    if tagged_url {
                        plan.url_expr = Some(quote!(#ident.url()));
                    } else if plan.url_expr.is_none() && type_ends_with(&pt.ty, "Url") {
                        plan.url_expr = Some(quote!(#ident));
                    }
                    if plan.invocation.is_none() && type_ends_with(&pt.ty, "Invocation") {
                        plan.invocation = Some(ident.clone());
                    }
                    plan.forwarded.push(ident);
                }
            }
        }

        // Strip `#[url]` tags from the re-emitted trait as well.
        for input in func.sig.inputs.iter_mut() {
            if let FnArg::Typed(pt) = input {
                take_url_tag(pt);
            }
        }

        if !takes_self_ref || !plan.returns_result {
            plan.url_expr = None;
        }
        // Default-bodied methods stay inherited unless explicitly marked
        // adaptive; required methods always need a synthesized body.
        if has_default_body && explicit_keys.is_none() {
            continue;
        }
        plans.push(plan);
    }

    let dispatchable = plans.iter().filter(|p| p.url_expr.is_some()).count();
    let synthesize = args.adaptive && dispatchable > 0;

    let crate_path = &args.crate_path;
    let core_path = &args.core_path;
    let trait_ident = &tr.ident;
    let trait_name = trait_ident.to_string();
    let vis = &tr.vis;
    let adaptive_ident = format_ident!("{trait_ident}Adaptive");

    let default_tokens = match &args.default {
        Some(d) => quote!(::core::option::Option::Some(#d)),
        None => quote!(::core::option::Option::None),
    };

    let synth_impl = if synthesize {
        quote! {
            fn synthesize_adaptive(
                registry: &::std::sync::Arc<#crate_path::ExtensionRegistry<Self>>,
            ) -> ::core::option::Option<::std::boxed::Box<Self>> {
                ::core::option::Option::Some(::std::boxed::Box::new(#adaptive_ident {
                    registry: ::std::sync::Arc::clone(registry),
                }))
            }
        }
    } else {
        quote!()
    };

    let point_impl = quote! {
        impl #crate_path::ExtensionPoint for dyn #trait_ident {
            const NAME: &'static str = #trait_name;
            const QUALIFIED: &'static str =
                ::core::concat!(::core::module_path!(), "::", #trait_name);
            const DEFAULT_NAME: ::core::option::Option<&'static str> = #default_tokens;

            fn lifecycle_of(
                instance: &Self,
            ) -> ::core::option::Option<&dyn #crate_path::Lifecycle> {
                instance.lifecycle()
            }

            #synth_impl
        }
    };

    let dispatcher = if synthesize {
        let methods = plans
            .iter()
            .map(|p| render_method(p, crate_path, core_path, trait_ident));
        quote! {
            #[doc(hidden)]
            #vis struct #adaptive_ident {
                registry: ::std::sync::Arc<#crate_path::ExtensionRegistry<dyn #trait_ident>>,
            }

            impl #crate_path::Extension for #adaptive_ident {}

            impl #trait_ident for #adaptive_ident {
                #(#methods)*
            }
        }
    } else {
        quote!()
    };

    quote! {
        #tr
        #point_impl
        #dispatcher
    }
    .into()
}

/// Renders one dispatcher method body.
fn render_method(
    plan: &MethodPlan,
    crate_path: &Path,
    core_path: &Path,
    trait_ident: &Ident,
) -> proc_macro2::TokenStream {
    let sig = plan.func.sig.clone();
    let method_ident = sig.ident.clone();
    let method_name = method_ident.to_string();

    let body = match &plan.url_expr {
        Some(url_expr) => {
            let keys_joined = plan.keys.join(", ");
            let lookups = plan.keys.iter().map(|key| {
                let attachment = plan.invocation.as_ref().map(|inv| {
                    quote! {
                        if __name.is_none() {
                            if let ::core::option::Option::Some(v) =
                                #core_path::Invocation::attachment(#inv, #key)
                            {
                                __name = ::core::option::Option::Some(v.to_string());
                            }
                        }
                    }
                });
                let method_scope = match &plan.invocation {
                    Some(inv) => quote! {
                        ::core::option::Option::Some(#core_path::Invocation::method_name(#inv))
                    },
                    None => quote!(::core::option::Option::None),
                };
                quote! {
                    #attachment
                    if __name.is_none() {
                        __name = #crate_path::adaptive::url_value(#url_expr, #method_scope, #key);
                    }
                }
            });
            let forwarded = &plan.forwarded;
            quote! {
                let mut __name: ::core::option::Option<::std::string::String> =
                    ::core::option::Option::None;
                #(#lookups)*
                let __name = match __name {
                    ::core::option::Option::Some(v) => v,
                    ::core::option::Option::None => {
                        match <dyn #trait_ident as #crate_path::ExtensionPoint>::DEFAULT_NAME {
                            ::core::option::Option::Some(d) => d.to_string(),
                            ::core::option::Option::None => {
                                return ::core::result::Result::Err(
                                    #crate_path::ExtensionError::MissingAdaptiveKey {
                                        point: <dyn #trait_ident as
                                            #crate_path::ExtensionPoint>::QUALIFIED,
                                        keys: #keys_joined,
                                    }
                                    .into(),
                                );
                            }
                        }
                    }
                };
                let __target = match self.registry.get(&__name) {
                    ::core::result::Result::Ok(t) => t,
                    ::core::result::Result::Err(e) => {
                        return ::core::result::Result::Err(e.into());
                    }
                };
                __target.#method_ident(#(#forwarded),*)
            }
        }
        None if plan.returns_result => quote! {
            ::core::result::Result::Err(
                #crate_path::ExtensionError::UnsupportedOperation {
                    point: <dyn #trait_ident as #crate_path::ExtensionPoint>::QUALIFIED,
                    method: #method_name,
                }
                .into(),
            )
        },
        None => quote! {
            ::core::panic!(
                "method `{}` on extension point `{}` has no URL parameter to dispatch on",
                #method_name,
                <dyn #trait_ident as #crate_path::ExtensionPoint>::QUALIFIED,
            )
        },
    };

    quote! {
        #sig {
            #body
        }
    }
}

/// Extracts and removes `#[adaptive(..)]` from a method, returning its keys.
fn take_adaptive_keys(func: &mut TraitItemFn) -> syn::Result<Option<Vec<String>>> {
    let mut keys = None;
    let mut err = None;
    func.attrs.retain(|attr| {
        if !attr.path().is_ident("adaptive") {
            return true;
        }
        let parsed = attr.parse_args_with(
            Punctuated::<syn::LitStr, Token![,]>::parse_terminated,
        );
        match parsed {
            Ok(list) => keys = Some(list.iter().map(|l| l.value()).collect::<Vec<_>>()),
            Err(e) => err = Some(e),
        }
        false
    });
    if let Some(e) = err {
        return Err(e);
    }
    Ok(keys)
}

/// Removes a `#[url]` tag from a parameter, reporting whether it was present.
fn take_url_tag(pt: &mut PatType) -> bool {
    let before = pt.attrs.len();
    pt.attrs.retain(|attr| !attr.path().is_ident("url"));
    before != pt.attrs.len()
}

/// Whether a (possibly referenced, possibly `dyn`) type's last path segment
/// matches `name`.
fn type_ends_with(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Reference(r) => type_ends_with(&r.elem, name),
        Type::Path(p) => p
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == name),
        Type::TraitObject(t) => t.bounds.iter().any(|b| match b {
            syn::TypeParamBound::Trait(t) => {
                t.path.segments.last().is_some_and(|s| s.ident == name)
            }
            _ => false,
        }),
        _ => false,
    }
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Type(_, ty) => type_ends_with(ty, "Result"),
        ReturnType::Default => false,
    }
}

/// `LoadBalance` → `load.balance`.
fn split_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i != 0 {
                out.push('.');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::split_case;

    #[test]
    fn splits_camel_case_names() {
        assert_eq!(split_case("LoadBalance"), "load.balance");
        assert_eq!(split_case("ThreadPool"), "thread.pool");
        assert_eq!(split_case("CacheFactory"), "cache.factory");
        assert_eq!(split_case("Cluster"), "cluster");
    }
}
