use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

use crate::crate_path::strata_core_path;

pub fn expand_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match generate(&input, true) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

pub fn expand_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match generate(&input, false) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Extract the `#[entity(table = "...")]` attribute from the struct.
fn extract_table(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut table = None;
    for attr in &input.attrs {
        if attr.path().is_ident("entity") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    let lit: syn::LitStr = meta.value()?.parse()?;
                    table = Some(lit.value());
                    Ok(())
                } else {
                    Err(meta.error("expected `table` in #[entity(table = \"...\")]"))
                }
            })?;
        }
    }
    Ok(table)
}

#[derive(Clone, Copy)]
enum Strategy {
    Uuid,
    ObjectId,
}

/// Parsed field-level `#[entity(...)]` attributes.
#[derive(Default)]
struct FieldAttrs {
    name: Option<String>,
    pk: bool,
    auto: bool,
    generated: Option<Strategy>,
    flatten: bool,
    skip: bool,
}

fn extract_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                result.name = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("pk") {
                result.pk = true;
                Ok(())
            } else if meta.path.is_ident("auto") {
                result.auto = true;
                Ok(())
            } else if meta.path.is_ident("generated") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                result.generated = match lit.value().as_str() {
                    "uuid" => Some(Strategy::Uuid),
                    "object_id" => Some(Strategy::ObjectId),
                    _ => {
                        return Err(syn::Error::new_spanned(
                            lit,
                            "expected \"uuid\" or \"object_id\"",
                        ))
                    }
                };
                Ok(())
            } else if meta.path.is_ident("flatten") {
                result.flatten = true;
                Ok(())
            } else if meta.path.is_ident("skip") {
                result.skip = true;
                Ok(())
            } else {
                Err(meta.error(
                    "expected `name`, `pk`, `auto`, `generated`, `flatten`, or `skip` in #[entity(...)]",
                ))
            }
        })?;
    }
    Ok(result)
}

enum Mapped {
    Column {
        ident: syn::Ident,
        ty: syn::Type,
        column: String,
        attrs: FieldAttrs,
    },
    Flatten {
        ident: syn::Ident,
        ty: syn::Type,
    },
}

fn parse_fields(input: &DeriveInput, derive: &str) -> syn::Result<Vec<Mapped>> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    format!("#[derive({derive})] only works on structs with named fields"),
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                format!("#[derive({derive})] only works on structs"),
            ))
        }
    };

    let mut mapped = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let attrs = extract_field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        if attrs.flatten {
            if attrs.name.is_some() || attrs.pk || attrs.auto || attrs.generated.is_some() {
                return Err(syn::Error::new_spanned(
                    &ident,
                    "#[entity(flatten)] cannot be combined with other field options",
                ));
            }
            mapped.push(Mapped::Flatten {
                ident,
                ty: field.ty.clone(),
            });
            continue;
        }
        if attrs.auto && attrs.generated.is_some() {
            return Err(syn::Error::new_spanned(
                &ident,
                "a column is either `auto` or `generated`, not both",
            ));
        }
        let column = attrs
            .name
            .clone()
            .unwrap_or_else(|| ident.unraw().to_string());
        mapped.push(Mapped::Column {
            ident,
            ty: field.ty.clone(),
            column,
            attrs,
        });
    }
    Ok(mapped)
}

fn generate(input: &DeriveInput, entity: bool) -> syn::Result<TokenStream2> {
    let derive = if entity { "Entity" } else { "Record" };
    let name = &input.ident;
    let krate = strata_core_path();
    let table = extract_table(input)?;
    let mapped = parse_fields(input, derive)?;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut defs = Vec::new();
    let mut read_arms = Vec::new();
    let mut write_arms = Vec::new();
    let mut read_nested = Vec::new();
    let mut write_nested = Vec::new();

    for m in &mapped {
        match m {
            Mapped::Column {
                ident,
                ty,
                column,
                attrs,
            } => {
                let field_name = ident.unraw().to_string();
                let pk = attrs.pk;
                let auto = attrs.auto;
                let generated = match attrs.generated {
                    Some(Strategy::Uuid) => {
                        quote!(::std::option::Option::Some(#krate::IdStrategy::Uuid))
                    }
                    Some(Strategy::ObjectId) => {
                        quote!(::std::option::Option::Some(#krate::IdStrategy::ObjectId))
                    }
                    None => quote!(::std::option::Option::None),
                };
                defs.push(quote! {
                    #krate::FieldDef::Column(#krate::ColumnDef {
                        field: #field_name,
                        name: #column,
                        primary_key: #pk,
                        auto_increment: #auto,
                        generated: #generated,
                        kind: <#ty as #krate::FromValue>::KIND,
                    })
                });
                read_arms.push(quote! {
                    #column => ::std::option::Option::Some(#krate::ToValue::to_value(&self.#ident)),
                });
                write_arms.push(quote! {
                    #column => {
                        self.#ident = <#ty as #krate::FromValue>::from_value(value).ok_or_else(|| {
                            #krate::DataError::decode(column, <#ty as #krate::FromValue>::KIND)
                        })?;
                        ::std::result::Result::Ok(true)
                    }
                });
            }
            Mapped::Flatten { ident, ty } => {
                let field_name = ident.unraw().to_string();
                defs.push(quote! {
                    #krate::FieldDef::Flatten {
                        field: #field_name,
                        fields: <#ty as #krate::Record>::fields,
                    }
                });
                read_nested.push(quote! {
                    if let ::std::option::Option::Some(found) = #krate::Record::read(&self.#ident, column) {
                        return ::std::option::Option::Some(found);
                    }
                });
                write_nested.push(quote! {
                    if #krate::Record::write(&mut self.#ident, column, value)? {
                        return ::std::result::Result::Ok(true);
                    }
                });
            }
        }
    }

    let record_impl = quote! {
        impl #impl_generics #krate::Record for #name #ty_generics #where_clause {
            fn fields() -> ::std::vec::Vec<#krate::FieldDef> {
                ::std::vec![#(#defs),*]
            }

            #[allow(unreachable_patterns, unreachable_code)]
            fn read(&self, column: &str) -> ::std::option::Option<#krate::Value> {
                match column {
                    #(#read_arms)*
                    _ => {
                        #(#read_nested)*
                        ::std::option::Option::None
                    }
                }
            }

            #[allow(unreachable_patterns, unreachable_code, unused_variables)]
            fn write(
                &mut self,
                column: &str,
                value: &#krate::Value,
            ) -> ::std::result::Result<bool, #krate::DataError> {
                match column {
                    #(#write_arms)*
                    _ => {
                        #(#write_nested)*
                        ::std::result::Result::Ok(false)
                    }
                }
            }
        }
    };

    if !entity {
        return Ok(record_impl);
    }

    let Some(table) = table else {
        return Err(syn::Error::new_spanned(
            name,
            "#[derive(Entity)] requires #[entity(table = \"...\")]\n\
             \n  example:\n  #[derive(Entity, Default)]\n  #[entity(table = \"person\")]\n  pub struct Person { ... }",
        ));
    };
    let pk_count = mapped
        .iter()
        .filter(|m| matches!(m, Mapped::Column { attrs, .. } if attrs.pk))
        .count();
    if pk_count > 1 {
        return Err(syn::Error::new_spanned(
            name,
            "#[derive(Entity)] allows at most one #[entity(pk)] field",
        ));
    }

    Ok(quote! {
        #record_impl

        impl #impl_generics #krate::Entity for #name #ty_generics #where_clause {
            fn table() -> &'static str {
                #table
            }
        }
    })
}
