//! Completion-queue core of a tag-matching fabric provider.
//!
//! `psmx` turns the completions of a tag-matching transport into the
//! fixed-layout completion entries applications read from completion
//! queues. Operations are posted through an [`Endpoint`] with a typed
//! context; the progress engine drains the transport on every CQ read and
//! routes each completion to the CQ and counter that context names.
//!
//! All resource holder types ([`Domain`], [`Cq`], [`Endpoint`], [`Mr`] and
//! [`Counter`]) are `Arc`-backed handles: `clone()` shares the underlying
//! object, and equality is identity.
//!
//! The transport is a trait ([`Transport`]); [`SimTransport`] is an
//! in-process implementation that lets the owner decide how posted
//! operations finish.
//!
//! # Example
//!
//! ```rust
//! use psmx::*;
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let sim = SimTransport::new();
//!     let domain = Domain::new(sim.clone(), ProviderConfig::default());
//!     let cq = domain.open_cq(&CqAttr::new(CqFormat::Tagged), 0)?;
//!     let ep = domain.endpoint();
//!     ep.bind_cq(&cq, BindFlags::SEND | BindFlags::RECV)?;
//!
//!     ep.send(1, 42, 0x1000, 128, Some(7))?;
//!     sim.complete_next(Outcome::ok(128));
//!
//!     let mut buf = [0u8; CqTaggedEntry::SIZE];
//!     assert_eq!(cq.read(&mut buf)?, CqTaggedEntry::SIZE);
//!     assert_eq!(CqTaggedEntry::decode(&buf).op_context, 7);
//!     Ok(())
//! }
//! ```

#[macro_use]
mod utils;

mod fabric;
pub use fabric::cntr::Counter;
pub use fabric::context::{LocalOp, MultiRecvRequest, OpContext};
pub use fabric::domain::Domain;
pub use fabric::ep::Endpoint;
pub use fabric::error::{errno, Error, Result};
pub use fabric::flags::*;
pub use fabric::mr::Mr;
pub use fabric::type_alias::*;
pub use fabric::{cq::*, transport::*};

/// Provider configuration.
pub mod config;
pub use config::{ConfigError, ProviderConfig};

/// The provider prelude.
pub mod prelude;
