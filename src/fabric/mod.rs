//! Provider objects.

pub mod cntr;
pub mod context;
pub mod cq;
pub mod domain;
pub mod ep;
pub mod error;
pub mod flags;
pub mod mr;
pub mod transport;
pub mod type_alias;
