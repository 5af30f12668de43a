//! Type aliases used across the provider.

/// [`u64`]: **Operation context**, an opaque caller-supplied identity returned with the completion.
pub type UserContext = u64;

/// [`u64`]: **Buffer address**, the caller's buffer as an opaque address.
pub type BufAddr = u64;

/// [`u64`]: **Matching tag**, used by tagged messaging and carried back in completions.
pub type Tag = u64;

/// [`u64`]: **Immediate data**, remote CQ data delivered with RMA operations. Zero means absent.
pub type ImmData = u64;

/// [`u64`]: **Endpoint identifier**, the transport-level name of a peer.
pub type Epid = u64;

/// [`u64`]: **Fabric address**, a resolved peer address handle.
pub type FiAddr = u64;

/// The "no address" sentinel written when a source address cannot be resolved.
pub const FI_ADDR_UNSPEC: FiAddr = u64::MAX;

/// Reserved tag bit marking a regular (non-RMA) message; the remaining bits carry the source epid.
pub const PSMX_MSG_BIT: Tag = 0x8000_0000_0000_0000;

/// Reserved tag bit marking RMA traffic.
pub const PSMX_RMA_BIT: Tag = 0x4000_0000_0000_0000;
