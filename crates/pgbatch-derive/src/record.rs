//! Record derive macro implementation.

use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

use crate::attrs::field_tag;

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record can only be derived for structs",
            ))
        }
    };

    let record_name = name.to_string().to_snake_case();

    let mut pushes = Vec::new();
    for field in fields {
        let tag = field_tag(field)?;
        if tag.ignore {
            continue;
        }

        let ident = field.ident.as_ref().unwrap();
        let ty = &field.ty;

        if tag.flatten {
            // Splice the inner record's fields in place, rebasing their
            // accessors onto this struct and assigning the group label
            // from this field's annotation.
            let group = match &tag.group {
                Some(g) => quote!(::core::option::Option::Some(#g)),
                None => quote!(::core::option::Option::None),
            };
            pushes.push(quote! {
                for def in <#ty as ::pgbatch::Record>::field_defs() {
                    defs.push(def.nest::<Self, #ty>(
                        #group,
                        |rec| &rec.#ident,
                        |rec| &mut rec.#ident,
                    ));
                }
            });
            continue;
        }

        let column = match &tag.column {
            Some(c) => c.clone(),
            None => ident.to_string().to_snake_case(),
        };
        let primary_key = tag.primary_key;
        let created = tag.created;
        let updated = tag.updated;
        let default_on_insert = tag.default_on_insert;
        let type_name = quote!(#ty).to_string().replace(' ', "");

        pushes.push(quote! {
            defs.push(::pgbatch::FieldDef {
                name: #column,
                flags: ::pgbatch::FieldFlags::new()
                    .primary_key(#primary_key)
                    .created(#created)
                    .updated(#updated)
                    .default_on_insert(#default_on_insert)
                    .null_wrapper(<#ty as ::pgbatch::SqlField>::NULLABLE),
                group: ::core::option::Option::None,
                type_name: #type_name,
                is_time: <#ty as ::pgbatch::SqlField>::IS_TIME,
                codec: ::pgbatch::FieldCodec {
                    emit: ::std::boxed::Box::new(|rec, buf| {
                        let rec = rec
                            .downcast_ref::<Self>()
                            .expect("record type mismatch");
                        ::pgbatch::SqlField::write_literal(&rec.#ident, buf);
                    }),
                    get: ::std::boxed::Box::new(|rec| {
                        let rec = rec
                            .downcast_ref::<Self>()
                            .expect("record type mismatch");
                        ::pgbatch::SqlField::to_value(&rec.#ident)
                    }),
                    scan: ::std::boxed::Box::new(|rec, row, idx| {
                        let rec = rec
                            .downcast_mut::<Self>()
                            .expect("record type mismatch");
                        rec.#ident =
                            <#ty as ::pgbatch::SqlField>::scan_field(row, idx)?;
                        ::core::result::Result::Ok(())
                    }),
                    set: ::std::boxed::Box::new(|rec, t| {
                        let rec = rec
                            .downcast_mut::<Self>()
                            .expect("record type mismatch");
                        ::pgbatch::SqlField::set_time(&mut rec.#ident, t);
                    }),
                },
            });
        });
    }

    Ok(quote! {
        impl #impl_generics ::pgbatch::Record for #name #ty_generics #where_clause {
            fn record_name() -> &'static str {
                #record_name
            }

            fn field_defs() -> ::std::vec::Vec<::pgbatch::FieldDef> {
                let mut defs = ::std::vec::Vec::new();
                #(#pushes)*
                defs
            }
        }
    })
}
