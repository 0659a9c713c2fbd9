//! Crate path resolution for generated code.
//!
//! Detects whether the user depends on `strata` (facade) or `strata-core`
//! directly, and returns the appropriate path prefix for generated code.
//!
//! Both crates declare `extern crate self as ...`, so an absolute path also
//! works from inside them and from their integration tests.

use proc_macro2::TokenStream;
use proc_macro_crate::{crate_name, FoundCrate};
use quote::quote;

fn absolute(found: FoundCrate, own: &str) -> TokenStream {
    let name = match found {
        FoundCrate::Itself => own.to_string(),
        FoundCrate::Name(name) => name,
    };
    let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
    quote!(::#ident)
}

/// Returns the token stream for accessing `strata_core` types.
///
/// If the user depends on `strata`, returns `::strata`.
/// Otherwise returns `::strata_core`.
pub fn strata_core_path() -> TokenStream {
    if let Ok(found) = crate_name("strata") {
        absolute(found, "strata")
    } else if let Ok(found) = crate_name("strata-core") {
        absolute(found, "strata_core")
    } else {
        // Fallback - assume strata_core is available (for error messages)
        quote!(::strata_core)
    }
}
