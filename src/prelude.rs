//! The provider prelude.
//!
//! The purpose of this module is to alleviate imports of common provider
//! functionalities.

pub use crate::config::ProviderConfig;
pub use crate::fabric::cntr::Counter;
pub use crate::fabric::cq::{
    Completion, ControlCommand, Cq, CqAttr, CqErrEntry, CqFormat, Entry, WaitHandle, WaitObj,
};
pub use crate::fabric::domain::Domain;
pub use crate::fabric::ep::Endpoint;
pub use crate::fabric::error::{Error, Result};
pub use crate::fabric::flags::{BindFlags, CompletionFlags};
pub use crate::fabric::mr::Mr;
pub use crate::fabric::transport::{SimTransport, Transport, TransportStatus};
pub use crate::fabric::type_alias::*;
