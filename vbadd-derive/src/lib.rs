use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{FnArg, GenericArgument, ItemFn, Pat, PathArguments, ReturnType, Type, parse_macro_input};

/// Exports a Rust function to a VBA host.
///
/// The function must return `Result<T, E>` with `E: Into<BridgeError>`. Each
/// parameter type must implement `FromAbi` and `VbaParam`, and `T` must
/// implement `IntoAbi` and `VbaReturn`. The macro keeps the function as is and
/// adds:
/// * an `extern "system"` wrapper exported under the function's name, which
///   converts the raw arguments, calls the function
///   and maps any failure to the return type's sentinel; Windows only
/// * an entry in the export catalog, whose description comes from the doc
///   comment. Lines of the form `* name: text` describe a parameter.
#[proc_macro_attribute]
pub fn vba_func(attr: TokenStream, input: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(input as ItemFn);

    parse_macro_input!(attr as syn::parse::Nothing);

    let fn_name = &input_fn.sig.ident;
    let export_name = fn_name.to_string();
    let wrapper_name = format_ident!("__vba_export_{}", fn_name);

    // Extract parameter information
    let mut param_names = Vec::new();
    let mut param_types = Vec::new();
    for input in &input_fn.sig.inputs {
        match input {
            FnArg::Typed(pat_type) => match pat_type.pat.as_ref() {
                Pat::Ident(pat_ident) => {
                    param_names.push(&pat_ident.ident);
                    param_types.push(&pat_type.ty);
                }
                other => {
                    return syn::Error::new_spanned(other, "vba_func parameters must be plain identifiers")
                        .to_compile_error()
                        .into();
                }
            },
            FnArg::Receiver(recv) => {
                return syn::Error::new_spanned(recv, "vba_func cannot export methods")
                    .to_compile_error()
                    .into();
            }
        }
    }

    let ok_type = match result_ok_type(&input_fn.sig.output) {
        Some(ty) => ty,
        None => {
            return syn::Error::new_spanned(
                &input_fn.sig.output,
                "vba_func functions must return Result<T, E>",
            )
            .to_compile_error()
            .into();
        }
    };

    let (description, param_docs) = parse_docs(&input_fn);
    let param_name_strs: Vec<String> = param_names.iter().map(|n| n.to_string()).collect();
    let param_descriptions: Vec<String> = param_name_strs
        .iter()
        .map(|n| param_docs.iter().find(|(p, _)| p == n).map(|(_, d)| d.clone()).unwrap_or_default())
        .collect();

    let expanded = quote! {
        #input_fn

        #[cfg(windows)]
        #[doc(hidden)]
        #[unsafe(export_name = #export_name)]
        pub extern "system" fn #wrapper_name(
            #(#param_names: <#param_types as vbadd_core::abi::FromAbi>::Abi),*
        ) -> <#ok_type as vbadd_core::abi::IntoAbi>::Abi {
            vbadd_core::abi::enter(#export_name);
            let call = move || -> ::std::result::Result<#ok_type, vbadd_core::BridgeError> {
                #(
                    let #param_names =
                        <#param_types as vbadd_core::abi::FromAbi>::from_abi(#param_names)?;
                )*
                #fn_name(#(#param_names),*).map_err(::std::convert::Into::into)
            };
            vbadd_core::abi::finish::<#ok_type>(#export_name, call())
        }

        inventory::submit! {
            vbadd_core::catalog::Export {
                name: #export_name,
                params: &[#(
                    vbadd_core::catalog::ParamInfo {
                        name: #param_name_strs,
                        passing: <#param_types as vbadd_core::catalog::VbaParam>::PASSING,
                        vba_type: <#param_types as vbadd_core::catalog::VbaParam>::VBA_TYPE,
                        description: #param_descriptions,
                    }
                ),*],
                returns: <#ok_type as vbadd_core::catalog::VbaReturn>::VBA_TYPE,
                description: #description,
            }
        }
    };

    TokenStream::from(expanded)
}

/// `T` from a `Result<T, E>` return type.
fn result_ok_type(output: &ReturnType) -> Option<&Type> {
    let ReturnType::Type(_, ty) = output else {
        return None;
    };
    let Type::Path(type_path) = ty.as_ref() else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

/// Splits the doc comment into the function description and `(param, text)`
/// pairs taken from `* param: text` lines. Headings (`#`) are skipped.
fn parse_docs(input_fn: &ItemFn) -> (String, Vec<(String, String)>) {
    let mut description = String::new();
    let mut params = Vec::new();

    for attr in &input_fn.attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        let syn::Meta::NameValue(meta) = &attr.meta else {
            continue;
        };
        let syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Str(lit), .. }) = &meta.value else {
            continue;
        };
        let line = lit.value();
        let line = line.trim();

        if let Some(content) = line.strip_prefix("* ") {
            if let Some(pos) = content.find(':') {
                let name = content[..pos].trim().replace('`', "");
                params.push((name, content[pos + 1..].trim().to_string()));
            }
        } else if !line.is_empty() && !line.starts_with('#') {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(line);
        }
    }

    (description, params)
}
