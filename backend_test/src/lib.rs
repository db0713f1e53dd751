use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Transform an asynchronous test into a synchronous one, enable test logging,
/// inject dependencies, and ensure that any database is dropped regardless of
/// how the test terminates.
///
/// Injectable dependencies are `Arc<crate::store::memory::MemoryStore>` (a fresh,
/// empty in-memory store) and [`mongodb::Database`] (a freshly named database on
/// the server at `DB_URI`). Tests that take a `Database` are marked `#[ignore]`,
/// since they need a live MongoDB server; run them with `cargo test -- --ignored`.
#[proc_macro_attribute]
pub fn backend_test(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the injection plan and reject invalid function signatures.
    let injections = match check_sig(item_fn.sig.clone()) {
        Ok(injections) => injections,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let test_args: Vec<TokenStream2> = injections
        .iter()
        .map(|injection| match injection {
            Injection::Store => quote! { store },
            Injection::Database => quote! { db.clone().unwrap() },
        })
        .collect();
    let needs_db = injections.contains(&Injection::Database);
    let maybe_ignore = if needs_db {
        quote! { #[ignore = "needs a MongoDB server at DB_URI"] }
    } else {
        quote! {}
    };
    let db_setup = if needs_db {
        quote! { Some(crate::config::test_database().await) }
    } else {
        quote! { None }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        #maybe_ignore
        fn #name() {
            /// Test setup.
            async fn setup() -> Option<mongodb::Database> {
                #db_setup
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(db: Option<mongodb::Database>) {
                if let Some(db) = db {
                    db.drop(None).await.unwrap();
                }
            }

            log4rs_test_utils::test_logging::init_logging_once_for(
                ["election_reconciler"],
                None,
                None,
            );

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = tokio::runtime::Builder::new_multi_thread()
                .thread_name("reconciler-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let db = outer_runtime.block_on(setup());

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let db_mutex = std::sync::Mutex::new(db.clone());
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                #[allow(unused_variables)]
                let db = db_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();
                #[allow(unused_variables)]
                let store = std::sync::Arc::new(crate::store::memory::MemoryStore::new());

                runtime.block_on(#new_name(#(#test_args),*));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(db));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// A dependency the test asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injection {
    Store,
    Database,
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<Injection>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut injections = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                let injection = match type_path.path.segments.last() {
                    Some(segment) if segment.ident == "Database" => Some(Injection::Database),
                    Some(segment) if segment.ident == "Arc" => match &segment.arguments {
                        PathArguments::AngleBracketed(generics) => match generics.args.first() {
                            Some(GenericArgument::Type(Type::Path(inner)))
                                if inner
                                    .path
                                    .segments
                                    .last()
                                    .map_or(false, |s| s.ident == "MemoryStore") =>
                            {
                                Some(Injection::Store)
                            }
                            _ => None,
                        },
                        _ => None,
                    },
                    _ => None,
                };

                if let Some(injection) = injection {
                    if injections.contains(&injection) {
                        return Err(syn::Error::new(
                            input.span(),
                            "Test cannot accept the same dependency more than once",
                        ));
                    }
                    injections.push(injection);
                    continue;
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `store_ident: Arc<MemoryStore>` or `db_ident: Database`",
        ));
    }

    Ok(injections)
}
