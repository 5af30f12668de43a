use super::entry::*;
use super::wait::WaitSet;
use crate::fabric::error::{Error, Result};

/// Completion entry format, selected once per CQ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CqFormat {
    /// Let the provider choose. Resolves to [`CqFormat::Tagged`] on open.
    #[default]
    Unspec = 0,
    /// [`CqEntry`].
    Context = 1,
    /// [`CqMsgEntry`].
    Msg = 2,
    /// [`CqDataEntry`].
    Data = 3,
    /// [`CqTaggedEntry`].
    Tagged = 4,
}

impl CqFormat {
    /// Resolve `Unspec` to the richest layout.
    #[inline]
    pub fn resolve(self) -> Self {
        match self {
            Self::Unspec => Self::Tagged,
            x => x,
        }
    }

    /// Get the fixed entry size of the (resolved) format.
    pub fn entry_size(self) -> usize {
        match self.resolve() {
            Self::Context => CqEntry::SIZE,
            Self::Msg => CqMsgEntry::SIZE,
            Self::Data => CqDataEntry::SIZE,
            Self::Tagged | Self::Unspec => CqTaggedEntry::SIZE,
        }
    }
}

impl TryFrom<u32> for CqFormat {
    type Error = Error;

    fn try_from(format: u32) -> Result<Self> {
        match format {
            0 => Ok(Self::Unspec),
            1 => Ok(Self::Context),
            2 => Ok(Self::Msg),
            3 => Ok(Self::Data),
            4 => Ok(Self::Tagged),
            x => {
                log::debug!("psmx: CQ format {} unsupported (supported: 0..=4)", x);
                Err(Error::InvalidArgument("unsupported CQ format"))
            }
        }
    }
}

/// Wait object requested for a CQ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WaitObj {
    /// No blocking support.
    #[default]
    None = 0,
    /// Let the provider choose. Resolves to [`WaitObj::Fd`].
    Unspec = 1,
    /// Signal an externally shared [`WaitSet`].
    Set = 2,
    /// Pipe-based file descriptor that becomes readable on new completions.
    Fd = 3,
    /// Mutex and condition variable pair.
    MutexCond = 4,
}

impl TryFrom<u32> for WaitObj {
    type Error = Error;

    fn try_from(wait_obj: u32) -> Result<Self> {
        match wait_obj {
            0 => Ok(Self::None),
            1 => Ok(Self::Unspec),
            2 => Ok(Self::Set),
            3 => Ok(Self::Fd),
            4 => Ok(Self::MutexCond),
            x => {
                log::debug!("psmx: wait object {} unsupported (supported: 0..=4)", x);
                Err(Error::InvalidArgument("unsupported wait object"))
            }
        }
    }
}

/// Wait condition for blocking reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WaitCond {
    /// Wake on any completion.
    #[default]
    None = 0,
    /// Wake once a threshold number of completions is queued.
    Threshold = 1,
}

impl TryFrom<u32> for WaitCond {
    type Error = Error;

    fn try_from(cond: u32) -> Result<Self> {
        match cond {
            0 => Ok(Self::None),
            1 => Ok(Self::Threshold),
            x => {
                log::debug!("psmx: wait condition {} unsupported (supported: 0..=1)", x);
                Err(Error::InvalidArgument("unsupported wait condition"))
            }
        }
    }
}

/// Completion queue attributes.
#[derive(Clone, Debug, Default)]
pub struct CqAttr {
    /// Completion entry format.
    pub format: CqFormat,

    /// Wait object to allocate.
    pub wait_obj: WaitObj,

    /// Wait condition.
    pub wait_cond: WaitCond,

    /// Wait set to signal; required when `wait_obj` is [`WaitObj::Set`].
    pub wait_set: Option<WaitSet>,
}

impl CqAttr {
    /// Create attributes with the given format and no wait object.
    pub fn new(format: CqFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Request a wait object.
    pub fn wait(mut self, wait_obj: WaitObj) -> Self {
        self.wait_obj = wait_obj;
        self
    }

    /// Request a wait set wait object signaling the given set.
    pub fn wait_set(mut self, set: &WaitSet) -> Self {
        self.wait_obj = WaitObj::Set;
        self.wait_set = Some(set.clone());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspec_resolves_to_tagged() {
        assert_eq!(CqFormat::Unspec.resolve(), CqFormat::Tagged);
        assert_eq!(CqFormat::Unspec.entry_size(), CqTaggedEntry::SIZE);
        assert_eq!(CqFormat::Msg.entry_size(), 24);
    }

    #[test]
    fn unknown_raw_values_rejected() {
        assert!(matches!(
            CqFormat::try_from(5),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(WaitObj::try_from(9), Err(Error::InvalidArgument(_))));
        assert!(matches!(WaitCond::try_from(2), Err(Error::InvalidArgument(_))));
        assert_eq!(CqFormat::try_from(3).ok(), Some(CqFormat::Data));
    }
}
