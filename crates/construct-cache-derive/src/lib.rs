//! Derive macros for the construct-cache crate.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Field, Index, LitStr, parse_macro_input, parse_quote};

/// Derive `KeyArgs` for a struct whose fields are the cache arguments.
///
/// Fields are pushed in declaration order. The signature defaults to the
/// module-qualified struct name, so same-named structs in different modules
/// never share keys. Override it with `#[key_args(signature = "...")]`.
/// Fields marked `#[key_args(skip)]` do not take part in the key.
#[proc_macro_derive(KeyArgs, attributes(key_args))]
pub fn key_args_derive(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	expand(input).unwrap_or_else(syn::Error::into_compile_error).into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
	let name = &input.ident;
	let signature = match container_signature(&input)? {
		Some(signature) => quote!(#signature),
		None => quote!(::core::concat!(::core::module_path!(), "::", ::core::stringify!(#name))),
	};

	let fields = match &input.data {
		Data::Struct(data) => &data.fields,
		Data::Enum(data) => {
			let message = "KeyArgs can only be derived for structs";
			return Err(syn::Error::new(data.enum_token.span, message));
		}
		Data::Union(data) => {
			let message = "KeyArgs can only be derived for structs";
			return Err(syn::Error::new(data.union_token.span, message));
		}
	};

	let mut pushes = Vec::new();
	for (index, field) in fields.iter().enumerate() {
		if is_skipped(field)? {
			continue;
		}
		let member = match &field.ident {
			Some(ident) => quote!(#ident),
			None => {
				let index = Index::from(index);
				quote!(#index)
			}
		};
		let position = pushes.len();
		pushes.push(quote_spanned! {field.ty.span()=>
			out.push(::construct_cache::ToArg::to_arg(&self.#member).map_err(|e| e.at(#position))?);
		});
	}

	let mut generics = input.generics.clone();
	for param in generics.type_params_mut() {
		param.bounds.push(parse_quote!(::construct_cache::ToArg));
	}
	let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

	Ok(quote! {
		impl #impl_generics ::construct_cache::KeyArgs for #name #ty_generics #where_clause {
			fn signature(&self) -> ::core::option::Option<&'static str> {
				::core::option::Option::Some(#signature)
			}

			#[allow(unused_variables)]
			fn push_args(
				&self,
				out: &mut ::std::vec::Vec<::construct_cache::ArgValue>,
			) -> ::core::result::Result<(), ::construct_cache::KeyDerivationError> {
				#(#pushes)*
				::core::result::Result::Ok(())
			}
		}
	})
}

fn container_signature(input: &DeriveInput) -> syn::Result<Option<LitStr>> {
	let mut signature = None;
	for attr in &input.attrs {
		if !attr.path().is_ident("key_args") {
			continue;
		}
		attr.parse_nested_meta(|meta| {
			if meta.path.is_ident("signature") {
				signature = Some(meta.value()?.parse::<LitStr>()?);
				Ok(())
			} else {
				Err(meta.error("expected `signature = \"...\"`"))
			}
		})?;
	}
	Ok(signature)
}

fn is_skipped(field: &Field) -> syn::Result<bool> {
	let mut skip = false;
	for attr in &field.attrs {
		if !attr.path().is_ident("key_args") {
			continue;
		}
		attr.parse_nested_meta(|meta| {
			if meta.path.is_ident("skip") {
				skip = true;
				Ok(())
			} else {
				Err(meta.error("expected `skip`"))
			}
		})?;
	}
	Ok(skip)
}
