#![macro_use]

/// Implement `Clone`, pointer-identity `PartialEq`/`Eq`, and a short `Debug`
/// for an `Arc`-backed resource handle with an `inner` field.
macro_rules! impl_shared_handle {
    ($handle:ty, $name:literal) => {
        impl Clone for $handle {
            fn clone(&self) -> Self {
                Self {
                    inner: self.inner.clone(),
                }
            }
        }

        impl PartialEq for $handle {
            fn eq(&self, other: &Self) -> bool {
                ::std::sync::Arc::ptr_eq(&self.inner, &other.inner)
            }
        }

        impl Eq for $handle {}

        impl ::std::fmt::Debug for $handle {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_fmt(format_args!(
                    concat!($name, "<{:p}>"),
                    ::std::sync::Arc::as_ptr(&self.inner)
                ))
            }
        }
    };
}
