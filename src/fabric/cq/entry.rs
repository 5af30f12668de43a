//! Fixed-layout completion entries.
//!
//! These are the caller-visible records copied out by `Cq::read` and friends.
//! Field order and widths are part of the binary contract: the opaque context
//! and buffer are carried as 64-bit values, lengths as 64-bit unsigned.

use std::{mem, ptr};

use crate::fabric::type_alias::*;

mod private {
    pub trait Sealed {}
}

/// A fixed-size, plain-old-data completion entry.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, contain no padding, and accept every
/// bit pattern as a valid value.
pub unsafe trait Entry: Copy + Default + private::Sealed {
    /// Size of the entry in bytes.
    const SIZE: usize = mem::size_of::<Self>();

    /// Copy the entry into the first `SIZE` bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panic if `buf` is shorter than `SIZE`.
    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        let dst = &mut buf[..Self::SIZE];
        // SAFETY: `Self` is POD without padding and `dst` holds exactly `SIZE` bytes.
        unsafe {
            ptr::copy_nonoverlapping(
                (self as *const Self).cast::<u8>(),
                dst.as_mut_ptr(),
                Self::SIZE,
            )
        };
    }

    /// Read an entry from the first `SIZE` bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panic if `buf` is shorter than `SIZE`.
    #[inline]
    fn decode(buf: &[u8]) -> Self {
        let src = &buf[..Self::SIZE];
        // SAFETY: `src` holds `SIZE` bytes and every bit pattern is a valid `Self`.
        unsafe { ptr::read_unaligned(src.as_ptr().cast::<Self>()) }
    }
}

/// Context-only completion entry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CqEntry {
    pub op_context: UserContext,
}

/// Message completion entry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CqMsgEntry {
    pub op_context: UserContext,
    pub flags: u64,
    pub len: u64,
}

/// Message completion entry with buffer and remote CQ data.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CqDataEntry {
    pub op_context: UserContext,
    pub flags: u64,
    pub len: u64,
    pub buf: BufAddr,
    pub data: ImmData,
}

/// Tagged completion entry. This is the richest success layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CqTaggedEntry {
    pub op_context: UserContext,
    pub flags: u64,
    pub len: u64,
    pub buf: BufAddr,
    pub data: ImmData,
    pub tag: Tag,
}

/// Error completion entry, used by the error side channel regardless of the
/// CQ's configured format.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CqErrEntry {
    pub op_context: UserContext,
    pub flags: u64,
    pub len: u64,
    pub buf: BufAddr,
    pub data: ImmData,
    pub tag: Tag,
    /// Bytes the peer sent beyond the receive buffer.
    pub olen: u64,
    /// Negative provider error number.
    pub err: i32,
    /// Raw transport status code.
    pub prov_errno: i32,
    /// Reserved for provider-specific error data; always zero.
    pub err_data: u64,
}

macro_rules! impl_entry {
    ($($ty:ty)*) => ($(
        impl private::Sealed for $ty {}

        // SAFETY: `#[repr(C)]`, fields are 8-byte integers (the two `i32`s in
        // `CqErrEntry` pair up), so there is no padding.
        unsafe impl Entry for $ty {}
    )*)
}

impl_entry!(CqEntry CqMsgEntry CqDataEntry CqTaggedEntry CqErrEntry);
