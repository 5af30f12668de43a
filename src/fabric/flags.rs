use bitflags::bitflags;

bitflags! {
    /// Operation flags carried in completion entries.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CompletionFlags: u64 {
        /// Message (send/receive) operation.
        const MSG = 1 << 1;
        /// RMA operation.
        const RMA = 1 << 2;
        /// Tagged messaging operation.
        const TAGGED = 1 << 3;
        /// Atomic operation.
        const ATOMIC = 1 << 4;
        /// Local read (RMA read or atomic fetch).
        const READ = 1 << 8;
        /// Local write.
        const WRITE = 1 << 9;
        /// Receive completion.
        const RECV = 1 << 10;
        /// Send completion.
        const SEND = 1 << 11;
        /// A peer read from local memory.
        const REMOTE_READ = 1 << 12;
        /// A peer wrote to local memory.
        const REMOTE_WRITE = 1 << 13;
        /// The multi-receive buffer has been released.
        const MULTI_RECV = 1 << 16;
        /// The completion carries remote CQ (immediate) data.
        const REMOTE_CQ_DATA = 1 << 17;
    }
}

bitflags! {
    /// Flags selecting which operations a CQ or counter binding covers.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BindFlags: u64 {
        /// Send-side operations.
        const SEND = 1 << 11;
        /// Receive-side operations.
        const RECV = 1 << 10;
        /// RMA reads issued locally.
        const READ = 1 << 8;
        /// RMA writes issued locally.
        const WRITE = 1 << 9;
        /// Remote reads targeting a memory region.
        const REMOTE_READ = 1 << 12;
        /// Remote writes targeting a memory region.
        const REMOTE_WRITE = 1 << 13;
        /// Only count operations that requested a completion.
        const EVENT = 1 << 56;
    }
}
