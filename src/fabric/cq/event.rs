//! Completion events and the event factory.

use super::attr::CqFormat;
use super::entry::*;
use super::CompletionFlags;
use crate::fabric::error::{Error, Result};
use crate::fabric::transport::NativeStatus;
use crate::fabric::type_alias::*;

/// A completion in one of the five entry layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Context(CqEntry),
    Msg(CqMsgEntry),
    Data(CqDataEntry),
    Tagged(CqTaggedEntry),
    Error(CqErrEntry),
}

impl Default for Completion {
    fn default() -> Self {
        Completion::Context(CqEntry::default())
    }
}

impl Completion {
    /// Whether this is an error completion.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Completion::Error(_))
    }

    /// Get the application-visible operation context.
    pub fn op_context(&self) -> UserContext {
        match self {
            Completion::Context(e) => e.op_context,
            Completion::Msg(e) => e.op_context,
            Completion::Data(e) => e.op_context,
            Completion::Tagged(e) => e.op_context,
            Completion::Error(e) => e.op_context,
        }
    }

    /// Get the operation flags. Context-only entries carry none.
    pub fn flags(&self) -> CompletionFlags {
        let bits = match self {
            Completion::Context(_) => 0,
            Completion::Msg(e) => e.flags,
            Completion::Data(e) => e.flags,
            Completion::Tagged(e) => e.flags,
            Completion::Error(e) => e.flags,
        };
        CompletionFlags::from_bits_retain(bits)
    }

    /// Get the entry size of this completion's layout.
    pub fn size(&self) -> usize {
        match self {
            Completion::Context(_) => CqEntry::SIZE,
            Completion::Msg(_) => CqMsgEntry::SIZE,
            Completion::Data(_) => CqDataEntry::SIZE,
            Completion::Tagged(_) => CqTaggedEntry::SIZE,
            Completion::Error(_) => CqErrEntry::SIZE,
        }
    }

    /// Copy the entry into `buf`. Return the number of bytes written.
    ///
    /// # Panics
    ///
    /// Panic if `buf` is shorter than [`Completion::size`].
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        match self {
            Completion::Context(e) => e.encode(buf),
            Completion::Msg(e) => e.encode(buf),
            Completion::Data(e) => e.encode(buf),
            Completion::Tagged(e) => e.encode(buf),
            Completion::Error(e) => e.encode(buf),
        }
        self.size()
    }
}

/// A pooled completion event: the completion plus routing leftovers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompletionEvent {
    pub(crate) cqe: Completion,

    /// Incoming tag of a receive completion, used to recover the sender.
    pub(crate) source: Option<Tag>,
}

impl CompletionEvent {
    /// Get the completion.
    #[inline]
    pub fn completion(&self) -> &Completion {
        &self.cqe
    }

    /// Whether this event must go through the error side channel.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.cqe.is_error()
    }
}

/// Fields of an application-synthesized completion.
///
/// `err` is a positive provider error number; zero means success, in which
/// case `olen` and `prov_errno` are ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppCompletion {
    pub op_context: UserContext,
    pub buf: BufAddr,
    pub flags: CompletionFlags,
    pub len: usize,
    pub data: ImmData,
    pub tag: Tag,
    pub olen: usize,
    pub err: i32,
    pub prov_errno: i32,
}

impl AppCompletion {
    /// Collect the fields present in a success entry of `format` from raw bytes.
    pub(crate) fn decode(format: CqFormat, buf: &[u8]) -> Result<Self> {
        let app = match format {
            CqFormat::Context => {
                let e = CqEntry::decode(buf);
                Self {
                    op_context: e.op_context,
                    ..Default::default()
                }
            }
            CqFormat::Msg => {
                let e = CqMsgEntry::decode(buf);
                Self {
                    op_context: e.op_context,
                    flags: CompletionFlags::from_bits_retain(e.flags),
                    len: e.len as usize,
                    ..Default::default()
                }
            }
            CqFormat::Data => {
                let e = CqDataEntry::decode(buf);
                Self {
                    op_context: e.op_context,
                    flags: CompletionFlags::from_bits_retain(e.flags),
                    len: e.len as usize,
                    buf: e.buf,
                    data: e.data,
                    ..Default::default()
                }
            }
            CqFormat::Tagged => {
                let e = CqTaggedEntry::decode(buf);
                Self {
                    op_context: e.op_context,
                    flags: CompletionFlags::from_bits_retain(e.flags),
                    len: e.len as usize,
                    buf: e.buf,
                    data: e.data,
                    tag: e.tag,
                    ..Default::default()
                }
            }
            CqFormat::Unspec => return Err(unsupported_format(format)),
        };
        Ok(app)
    }

    /// Collect the fields of an error entry.
    pub(crate) fn from_err_entry(e: &CqErrEntry) -> Self {
        Self {
            op_context: e.op_context,
            buf: e.buf,
            flags: CompletionFlags::from_bits_retain(e.flags),
            len: e.len as usize,
            data: e.data,
            tag: e.tag,
            olen: e.olen as usize,
            err: e.err.saturating_abs(),
            prov_errno: e.prov_errno,
        }
    }
}

fn unsupported_format(format: CqFormat) -> Error {
    log::error!("psmx: unsupported CQ format {:?}", format);
    Error::InvalidArgument("unsupported CQ format")
}

/// Fill `event` from application-supplied fields.
///
/// A non-zero `err` always produces the error layout; otherwise the layout of
/// `format` is produced.
pub(crate) fn create_event(
    format: CqFormat,
    event: &mut CompletionEvent,
    app: &AppCompletion,
) -> Result<()> {
    event.source = None;

    if app.err != 0 {
        event.cqe = Completion::Error(CqErrEntry {
            op_context: app.op_context,
            flags: app.flags.bits(),
            len: app.len as u64,
            buf: app.buf,
            data: app.data,
            tag: app.tag,
            olen: app.olen as u64,
            err: -app.err,
            prov_errno: app.prov_errno,
            err_data: 0,
        });
        return Ok(());
    }

    event.cqe = match format {
        CqFormat::Context => Completion::Context(CqEntry {
            op_context: app.op_context,
        }),
        CqFormat::Msg => Completion::Msg(CqMsgEntry {
            op_context: app.op_context,
            flags: app.flags.bits(),
            len: app.len as u64,
        }),
        CqFormat::Data => Completion::Data(CqDataEntry {
            op_context: app.op_context,
            flags: app.flags.bits(),
            len: app.len as u64,
            buf: app.buf,
            data: app.data,
        }),
        CqFormat::Tagged => Completion::Tagged(CqTaggedEntry {
            op_context: app.op_context,
            flags: app.flags.bits(),
            len: app.len as u64,
            buf: app.buf,
            data: app.data,
            tag: app.tag,
        }),
        CqFormat::Unspec => return Err(unsupported_format(format)),
    };
    Ok(())
}

/// Fill `event` from a native transport status.
///
/// `data` is immediate data delivered alongside the operation; zero means
/// none and leaves the entry's data field zero.
pub(crate) fn create_event_from_status(
    format: CqFormat,
    event: &mut CompletionEvent,
    status: &NativeStatus,
    data: ImmData,
) -> Result<()> {
    let view = status.context.view();
    let mut flags = view.flags;
    if data != 0 {
        flags |= CompletionFlags::REMOTE_CQ_DATA;
    }

    event.cqe = if !status.error.is_ok() {
        Completion::Error(CqErrEntry {
            op_context: view.op_context,
            flags: flags.bits(),
            len: status.nbytes as u64,
            buf: view.buf,
            data,
            tag: status.msg_tag,
            olen: status.overrun() as u64,
            err: -status.error.errno(),
            prov_errno: status.error.code(),
            err_data: 0,
        })
    } else {
        match format {
            CqFormat::Context => Completion::Context(CqEntry {
                op_context: view.op_context,
            }),
            CqFormat::Msg => Completion::Msg(CqMsgEntry {
                op_context: view.op_context,
                flags: flags.bits(),
                len: status.nbytes as u64,
            }),
            CqFormat::Data => Completion::Data(CqDataEntry {
                op_context: view.op_context,
                flags: flags.bits(),
                len: status.nbytes as u64,
                buf: view.buf,
                data,
            }),
            CqFormat::Tagged => Completion::Tagged(CqTaggedEntry {
                op_context: view.op_context,
                flags: flags.bits(),
                len: status.nbytes as u64,
                buf: view.buf,
                data,
                tag: status.msg_tag,
            }),
            CqFormat::Unspec => return Err(unsupported_format(format)),
        }
    };

    event.source = view.is_recv.then_some(status.msg_tag);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::error::errno::*;
    use crate::fabric::context::{LocalOp, OpContext};
    use crate::fabric::domain::Domain;
    use crate::fabric::transport::{SimTransport, TransportStatus};

    fn recv_status(domain: &Domain, error: TransportStatus) -> NativeStatus {
        NativeStatus {
            context: OpContext::Local {
                ep: domain.endpoint(),
                op: LocalOp::Recv {
                    context: 0xc0,
                    buf: 0xb000,
                },
            },
            error,
            msg_tag: 0x8000_0000_0000_0007,
            msg_length: 100,
            nbytes: 64,
        }
    }

    #[test]
    fn app_error_overrides_format() -> anyhow::Result<()> {
        let mut ev = CompletionEvent::default();
        let app = AppCompletion {
            op_context: 9,
            tag: 3,
            olen: 12,
            err: FI_ETRUNC,
            ..Default::default()
        };
        create_event(CqFormat::Context, &mut ev, &app)?;
        let Completion::Error(e) = ev.cqe else {
            panic!("expected an error entry, got {:?}", ev.cqe);
        };
        assert_eq!(e.err, -FI_ETRUNC);
        assert_eq!(e.olen, 12);
        assert_eq!(e.prov_errno, 0);
        assert_eq!(ev.source, None);
        Ok(())
    }

    #[test]
    fn app_success_uses_format() -> anyhow::Result<()> {
        let mut ev = CompletionEvent::default();
        let app = AppCompletion {
            op_context: 1,
            flags: CompletionFlags::RECV,
            len: 128,
            data: 5,
            tag: 42,
            ..Default::default()
        };
        create_event(CqFormat::Msg, &mut ev, &app)?;
        assert_eq!(
            ev.cqe,
            Completion::Msg(CqMsgEntry {
                op_context: 1,
                flags: CompletionFlags::RECV.bits(),
                len: 128,
            })
        );
        assert!(create_event(CqFormat::Unspec, &mut ev, &app).is_err());
        Ok(())
    }

    #[test]
    fn status_success_keeps_source_hint() -> anyhow::Result<()> {
        let domain = Domain::new(SimTransport::new(), Default::default());
        let status = recv_status(&domain, TransportStatus::Ok);
        let mut ev = CompletionEvent::default();

        create_event_from_status(CqFormat::Tagged, &mut ev, &status, 0)?;
        let Completion::Tagged(e) = ev.cqe else {
            panic!("expected a tagged entry, got {:?}", ev.cqe);
        };
        assert_eq!(e.op_context, 0xc0);
        assert_eq!(e.buf, 0xb000);
        assert_eq!(e.len, 64);
        assert_eq!(e.data, 0);
        assert_eq!(e.tag, status.msg_tag);
        assert!(!CompletionFlags::from_bits_retain(e.flags).contains(CompletionFlags::REMOTE_CQ_DATA));
        assert_eq!(ev.source, Some(status.msg_tag));

        create_event_from_status(CqFormat::Data, &mut ev, &status, 77)?;
        let Completion::Data(e) = ev.cqe else {
            panic!("expected a data entry, got {:?}", ev.cqe);
        };
        assert_eq!(e.data, 77);
        assert!(CompletionFlags::from_bits_retain(e.flags).contains(CompletionFlags::REMOTE_CQ_DATA));
        Ok(())
    }

    #[test]
    fn status_error_translates_code() -> anyhow::Result<()> {
        let domain = Domain::new(SimTransport::new(), Default::default());
        let status = recv_status(&domain, TransportStatus::MqTruncation);
        let mut ev = CompletionEvent::default();

        create_event_from_status(CqFormat::Context, &mut ev, &status, 0)?;
        let Completion::Error(e) = ev.cqe else {
            panic!("expected an error entry, got {:?}", ev.cqe);
        };
        assert_eq!(e.err, -FI_ETRUNC);
        assert_eq!(e.prov_errno, TransportStatus::MqTruncation.code());
        assert_eq!(e.olen, 36);
        assert_eq!(e.tag, status.msg_tag);
        Ok(())
    }
}
