/// Provide interoperability with C return values.
pub(crate) mod interop;

/// Shared-handle trait boilerplate.
pub(crate) mod boilerplate;
