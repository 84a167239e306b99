//! gfxtest Macros
//!
//! Attribute macros that turn a function into the `main` of a test binary.
//!
//! ## Macros
//!
//! - `#[gfxtest::main]` - Test with subtests, receives `&mut TestRun`
//! - `#[gfxtest::simple_main]` - Test without subtests

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{ItemFn, parse_macro_input};

mod attr {
    use syn::meta::ParseNestedMeta;

    /// Get the attribute name as a string
    pub fn name(meta: &ParseNestedMeta) -> String {
        meta.path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default()
    }

    /// Parse a string literal attribute: `attr = "value"`
    pub fn string(meta: &ParseNestedMeta) -> syn::Result<String> {
        let value: syn::LitStr = meta.value()?.parse()?;
        Ok(value.value())
    }

    /// Parse a path attribute: `attr = some::function`
    pub fn path(meta: &ParseNestedMeta) -> syn::Result<syn::Path> {
        meta.value()?.parse()
    }

    /// Create an unknown attribute error
    pub fn unknown(meta: &ParseNestedMeta, name: &str) -> syn::Error {
        meta.error(format!("unknown attribute: {}", name))
    }
}

#[derive(Default)]
struct MainConfig {
    help: Option<String>,
    options: Option<syn::Path>,
    timeout_ns: Option<u64>,
}

fn parse_main_config(args: TokenStream2) -> Result<MainConfig, syn::Error> {
    let mut config = MainConfig::default();
    if args.is_empty() {
        return Ok(config);
    }

    let parser = syn::meta::parser(|meta| {
        let name = attr::name(&meta);
        match name.as_str() {
            "help" => config.help = Some(attr::string(&meta)?),
            "options" => config.options = Some(attr::path(&meta)?),
            "timeout" => {
                let raw = attr::string(&meta)?;
                config.timeout_ns = Some(
                    parse_duration(&raw)
                        .ok_or_else(|| meta.error(format!("invalid duration: {raw:?}")))?,
                );
            }
            _ => return Err(attr::unknown(&meta, &name)),
        }
        Ok(())
    });

    syn::parse::Parser::parse2(parser, args)?;
    Ok(config)
}

fn parse_duration(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.starts_with('-') {
        return None;
    }
    let split = s.find(|c: char| c.is_alphabetic()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.trim().parse().ok()?;
    let multiplier: f64 = match unit {
        "ms" => 1e6,
        "s" | "" => 1e9,
        "m" | "min" => 60e9,
        "h" => 3600e9,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

fn validate_signature(func: &ItemFn, inputs: &[usize], expected: &str) -> syn::Result<()> {
    if func.sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(
            func.sig.asyncness,
            "gfxtest: test entry points cannot be async",
        ));
    }
    if !inputs.contains(&func.sig.inputs.len()) {
        return Err(syn::Error::new_spanned(
            &func.sig,
            format!("gfxtest: function must have the signature `{expected}`"),
        ));
    }
    if !func.sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &func.sig.generics,
            "gfxtest: test entry points cannot be generic",
        ));
    }
    Ok(())
}

/// Build the `ExtraOptions` expression and the timeout statement.
fn setup_tokens(config: &MainConfig) -> (TokenStream2, TokenStream2) {
    let base = match &config.options {
        Some(path) => quote! { #path() },
        None => quote! { ::gfxtest::ExtraOptions::new() },
    };
    let extra = match &config.help {
        Some(help) => quote! { #base.help(#help) },
        None => base,
    };
    let timeout = match config.timeout_ns {
        Some(ns) => quote! {
            if !run.is_listing() && run.options().timeout.is_none() {
                run.set_timeout(::std::time::Duration::from_nanos(#ns));
            }
        },
        None => quote! {},
    };
    (extra, timeout)
}

/// Entry point of a test binary with subtests
///
/// The function receives the initialized run and may return `()` or
/// `TestResult`. A skip or failure returned from it (outside any subtest)
/// ends the run.
///
/// # Example
///
/// ```ignore
/// #[gfxtest::main(help = "  --rounds N  repeat N times", options = extra_options)]
/// fn main(run: &mut TestRun) -> TestResult {
///     let fd = run.fixture(open_device);
///     run.subtest("basic", |_| {
///         gt_require!(fd.is_some());
///         Ok(())
///     });
///     Ok(())
/// }
///
/// // With a default timeout (command line and gfxtest.toml take precedence)
/// #[gfxtest::main(timeout = "5m")]
/// fn main(run: &mut TestRun) { ... }
/// ```
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let func = parse_macro_input!(item as ItemFn);

    main_impl(args, func)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn main_impl(args: TokenStream2, func: ItemFn) -> Result<TokenStream2, syn::Error> {
    validate_signature(&func, &[1], "fn main(run: &mut TestRun)")?;
    let config = parse_main_config(args)?;

    let fn_name = func.sig.ident.clone();
    let vis = func.vis.clone();
    let inner_name = format_ident!("__gfxtest_{}", fn_name);
    let mut inner = func;
    inner.sig.ident = inner_name.clone();
    let (extra, timeout) = setup_tokens(&config);

    Ok(quote! {
        #vis fn #fn_name() {
            #inner

            let mut run = ::gfxtest::TestRun::init(#extra);
            #timeout
            let result = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                ::gfxtest::IntoTestResult::into_test_result(#inner_name(&mut run))
            }))
            .unwrap_or_else(|payload| ::std::result::Result::Err(::gfxtest::Bail::from_panic(payload)));
            run.exit_with(result)
        }
    })
}

/// Entry point of a test binary without subtests
///
/// The function may return `()` or `TestResult`. It takes no arguments, or
/// a `&mut Subtest` handle when it forks children. The process exits 0 on
/// success, 77 on a skip and with the failure code otherwise.
///
/// # Example
///
/// ```ignore
/// #[gfxtest::simple_main]
/// fn main() -> TestResult {
///     gt_require!(has_feature());
///     gt_assert_eq!(read_register(), 0);
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn simple_main(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let func = parse_macro_input!(item as ItemFn);

    simple_main_impl(args, func)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn simple_main_impl(args: TokenStream2, func: ItemFn) -> Result<TokenStream2, syn::Error> {
    validate_signature(&func, &[0, 1], "fn main()` or `fn main(test: &mut Subtest)")?;
    let config = parse_main_config(args)?;
    let takes_handle = func.sig.inputs.len() == 1;

    let fn_name = func.sig.ident.clone();
    let vis = func.vis.clone();
    let inner_name = format_ident!("__gfxtest_{}", fn_name);
    let mut inner = func;
    inner.sig.ident = inner_name.clone();
    let (extra, timeout) = setup_tokens(&config);
    let call = if takes_handle {
        quote! { #inner_name(test) }
    } else {
        quote! { { let _ = test; #inner_name() } }
    };

    Ok(quote! {
        #vis fn #fn_name() {
            #inner

            #[allow(unused_mut)]
            let mut run = ::gfxtest::TestRun::init_simple(#extra);
            #timeout
            run.simple(|test: &mut ::gfxtest::Subtest<'_>| {
                ::gfxtest::IntoTestResult::into_test_result(#call)
            })
        }
    })
}
