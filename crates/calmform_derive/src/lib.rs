use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormValues, attributes(form))]
pub fn derive_form_values(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.ident,
            "FormValues derive currently supports only non-generic structs",
        ));
    }

    let model_ident = input.ident;
    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormValues derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormValues derive is only supported on structs",
            ));
        }
    };

    let calmform = calmform_path();
    let mut inserts = Vec::new();
    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let options = FieldOptions::parse(&field.attrs)?;
        if options.skip {
            continue;
        }
        let key = match options.rename {
            Some(rename) => {
                let value = rename.value();
                if value.is_empty() || value.contains('.') {
                    return Err(syn::Error::new_spanned(
                        rename,
                        "form rename must be a single non-empty path segment",
                    ));
                }
                value
            }
            None => field_ident.to_string(),
        };

        inserts.push(quote! {
            if let ::core::option::Option::Some(value) =
                #calmform::form::ToFormValue::to_form_value(&self.#field_ident)
            {
                tree.insert(#key, value);
            }
        });
    }

    Ok(quote! {
        impl #calmform::form::ToValueTree for #model_ident {
            fn to_value_tree(&self) -> #calmform::form::ValueTree {
                let mut tree = #calmform::form::ValueTree::new();
                #(#inserts)*
                tree
            }
        }

        impl #calmform::form::ToFormValue for #model_ident {
            fn to_form_value(&self) -> ::core::option::Option<#calmform::form::Value> {
                ::core::option::Option::Some(#calmform::form::Value::Tree(
                    #calmform::form::ToValueTree::to_value_tree(self),
                ))
            }
        }
    })
}

#[derive(Default)]
struct FieldOptions {
    rename: Option<LitStr>,
    skip: bool,
}

impl FieldOptions {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut options = Self::default();
        for attr in attrs.iter().filter(|attr| attr.path().is_ident("form")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    options.rename = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    options.skip = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `rename = \"...\"` or `skip`"))
                }
            })?;
        }
        Ok(options)
    }
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
