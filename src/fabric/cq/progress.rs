//! The progress engine.
//!
//! Drains finished requests from the transport and routes each one to the
//! CQ and counter its context names.

use super::event::AppCompletion;
use super::{CompletionFlags, Cq};
use crate::fabric::cntr::Counter;
use crate::fabric::context::{LocalOp, MultiRecvRequest, OpContext};
use crate::fabric::domain::Domain;
use crate::fabric::ep::Endpoint;
use crate::fabric::error::Result;
use crate::fabric::transport::{NativeStatus, PostedOp, Transport, TransportStatus};
use crate::fabric::type_alias::ImmData;

/// Where one native completion goes.
struct Route {
    cq: Option<Cq>,
    cntr: Option<Counter>,
    data: ImmData,
}

/// Drain the transport.
///
/// With a `target`, return `1` as soon as an event lands in that CQ;
/// completions for other CQs are routed and draining continues. Return `0`
/// once the transport has nothing left. Failures of the transport's own
/// calls abort the drain.
pub(crate) fn poll_mq(domain: &Domain, target: Option<&Cq>) -> Result<usize> {
    let mut transport = domain.transport();
    loop {
        let req = match transport.ipeek() {
            Ok(Some(req)) => req,
            Ok(None) | Err(TransportStatus::MqNoCompletions) => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let status = transport.test(req)?;
        log::trace!(
            "psmx: request {} finished ({}), {} bytes",
            req,
            status.error,
            status.nbytes
        );

        if dispatch(&mut **transport, status, target)? {
            return Ok(1);
        }
    }
}

/// Route one completion. Return whether an event landed in `target`.
fn dispatch(transport: &mut dyn Transport, status: NativeStatus, target: Option<&Cq>) -> Result<bool> {
    let route = classify(&status);
    let hit = match &route.cq {
        Some(cq) => cq.push_status(&status, route.data)? && target.is_some_and(|t| t == cq),
        None => false,
    };
    if let Some(cntr) = &route.cntr {
        cntr.add(1);
    }

    match status.context {
        OpContext::Local {
            ep,
            op: LocalOp::MultiRecv(req),
        } => {
            let done = continue_multi_recv(transport, ep, req, status.nbytes, route.cq.as_ref())?;
            Ok(hit || done.is_some_and(|cq| target.is_some_and(|t| *t == cq)))
        }
        _ => Ok(hit),
    }
}

fn classify(status: &NativeStatus) -> Route {
    let (ep, op) = match &status.context {
        OpContext::RemoteWrite { mr, data } => {
            let b = mr.bindings();
            return Route {
                cq: b.cq,
                cntr: b.cntr,
                data: *data,
            };
        }
        OpContext::RemoteRead { mr } => {
            let b = mr.bindings();
            return Route {
                cq: b.cq,
                cntr: b.cntr,
                data: 0,
            };
        }
        OpContext::Local { ep, op } => (ep, op),
    };

    let b = ep.bindings();
    let bare = |cntr: Option<Counter>, event_only: bool| Route {
        cq: None,
        cntr: cntr.filter(|_| !event_only),
        data: 0,
    };
    let full = |cq: Option<Cq>, cntr: Option<Counter>| Route { cq, cntr, data: 0 };

    let bare_op = matches!(
        op,
        LocalOp::NocompSend
            | LocalOp::NocompRecv
            | LocalOp::NocompWrite
            | LocalOp::NocompRead
            | LocalOp::Inject { .. }
            | LocalOp::InjectWrite { .. }
    );
    if bare_op && !status.error.is_ok() {
        log::warn!(
            "psmx: operation without completion failed on {:?}: {}",
            ep,
            status.error
        );
    }

    match op {
        LocalOp::NocompSend | LocalOp::Inject { .. } => {
            ep.retire_send();
            bare(b.send_cntr, b.send_cntr_event)
        }
        LocalOp::NocompRecv => bare(b.recv_cntr, b.recv_cntr_event),
        LocalOp::NocompWrite | LocalOp::InjectWrite { .. } => {
            ep.retire_write();
            bare(b.write_cntr, b.write_cntr_event)
        }
        LocalOp::NocompRead => {
            ep.retire_read();
            bare(b.read_cntr, b.read_cntr_event)
        }
        LocalOp::Send { .. } => {
            ep.retire_send();
            full(b.send_cq, b.send_cntr)
        }
        LocalOp::Recv { .. } | LocalOp::MultiRecv(_) => full(b.recv_cq, b.recv_cntr),
        LocalOp::Read { .. } => {
            ep.retire_read();
            full(b.send_cq, b.read_cntr)
        }
        LocalOp::Write { .. } => {
            ep.retire_write();
            full(b.send_cq, b.write_cntr)
        }
    }
}

/// Account for one multi-receive segment, then re-post or retire the request.
///
/// Return the CQ that received the final completion, if the request retired.
fn continue_multi_recv(
    transport: &mut dyn Transport,
    ep: Endpoint,
    mut req: Box<MultiRecvRequest>,
    nbytes: usize,
    recv_cq: Option<&Cq>,
) -> Result<Option<Cq>> {
    req.consume(nbytes);

    if req.has_room() {
        let op = PostedOp::Recv {
            tag: req.tag,
            tagsel: req.tagsel,
            buf: req.cursor(),
            len: req.remaining(),
        };
        let context = OpContext::Local {
            ep,
            op: LocalOp::MultiRecv(req),
        };
        transport.post(op, context).map_err(|e| {
            log::error!("psmx: failed to re-post multi-receive segment: {}", e);
            e
        })?;
        return Ok(None);
    }

    let app = AppCompletion {
        op_context: req.context,
        buf: req.buf,
        flags: CompletionFlags::RECV | CompletionFlags::MULTI_RECV,
        len: req.len,
        data: (req.len - req.offset) as ImmData,
        ..Default::default()
    };
    match recv_cq {
        Some(cq) if cq.push_internal(&app)? => Ok(Some(cq.clone())),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::cq::attr::{CqAttr, CqFormat};
    use crate::fabric::cq::entry::{CqTaggedEntry, Entry};
    use crate::fabric::cq::event::Completion;
    use crate::fabric::flags::BindFlags;
    use crate::fabric::transport::{Outcome, SimTransport};
    use crate::config::ProviderConfig;
    use crate::fabric::type_alias::PSMX_MSG_BIT;

    fn setup() -> (SimTransport, Domain, Endpoint, Cq) {
        let sim = SimTransport::new();
        let domain = Domain::new(sim.clone(), ProviderConfig::default());
        let ep = domain.endpoint();
        let cq = domain
            .open_cq(&CqAttr::new(CqFormat::Tagged), 0)
            .expect("open cq");
        ep.bind_cq(&cq, BindFlags::SEND | BindFlags::RECV)
            .expect("bind cq");
        (sim, domain, ep, cq)
    }

    fn tagged(cq: &Cq) -> Option<CqTaggedEntry> {
        match cq.read_entry().expect("read") {
            Some(Completion::Tagged(e)) => Some(e),
            None => None,
            Some(other) => panic!("unexpected completion {:?}", other),
        }
    }

    #[test]
    fn multi_recv_reposts_then_retires() -> anyhow::Result<()> {
        let (sim, domain, ep, cq) = setup();
        let cntr = domain.counter();
        ep.bind_cntr(&cntr, BindFlags::RECV)?;

        // 100-byte buffer, 30-byte minimum, 40-byte messages.
        ep.recv_multi(0, !0, 0x1000, 100, 30, 0xabc)?;
        let mut cursors = vec![];
        for _ in 0..2 {
            let posted = sim.posted();
            assert_eq!(posted.len(), 1);
            let PostedOp::Recv { buf, len, .. } = posted[0].1 else {
                panic!("expected a receive, got {:?}", posted[0].1);
            };
            cursors.push((buf, len));
            sim.complete_next(Outcome::ok(40));

            let e = tagged(&cq).expect("segment completion");
            assert_eq!(e.op_context, 0xabc);
            assert_eq!(e.buf, buf);
            assert_eq!(e.len, 40);
            assert!(!CompletionFlags::from_bits_retain(e.flags).contains(CompletionFlags::MULTI_RECV));
        }
        assert_eq!(cursors, vec![(0x1000, 100), (0x1000 + 40, 60)]);

        // 20 bytes remain, below the minimum: the request retired.
        assert_eq!(sim.outstanding(), 0);
        let last = tagged(&cq).expect("final completion");
        let flags = CompletionFlags::from_bits_retain(last.flags);
        assert!(flags.contains(CompletionFlags::MULTI_RECV | CompletionFlags::RECV));
        assert_eq!(last.buf, 0x1000);
        assert_eq!(last.len, 100);
        assert_eq!(last.data, 20);
        assert!(tagged(&cq).is_none());
        assert_eq!(cntr.read(), 2);
        Ok(())
    }

    #[test]
    fn counter_and_event_each_once() -> anyhow::Result<()> {
        let (sim, domain, ep, cq) = setup();
        let cntr = domain.counter();
        ep.bind_cntr(&cntr, BindFlags::SEND)?;

        ep.send(7, 5, 0x2000, 16, Some(0x11))?;
        assert_eq!(ep.pending_sends(), 1);
        sim.complete_next(Outcome::ok(16));

        let e = tagged(&cq).expect("send completion");
        assert_eq!(e.op_context, 0x11);
        assert!(tagged(&cq).is_none());
        assert_eq!(cntr.read(), 1);
        assert_eq!(ep.pending_sends(), 0);
        Ok(())
    }

    #[test]
    fn event_flag_skips_bare_operations() -> anyhow::Result<()> {
        let (sim, domain, ep, cq) = setup();
        let counted = domain.counter();
        let all = domain.counter();
        ep.bind_cntr(&counted, BindFlags::SEND | BindFlags::EVENT)?;
        ep.bind_cntr(&all, BindFlags::WRITE)?;

        ep.send(7, 5, 0x2000, 16, None)?;
        ep.inject(7, 5, b"hello")?;
        ep.write(7, 0x9000, 1, 0x2000, 8, 0, None)?;
        while sim.complete_next(Outcome::ok(8)).is_some() {}
        domain.progress()?;

        assert_eq!(counted.read(), 0);
        assert_eq!(all.read(), 1);
        assert_eq!(ep.pending_sends(), 0);
        assert_eq!(ep.pending_writes(), 0);
        assert!(tagged(&cq).is_none());
        Ok(())
    }

    #[test]
    fn remote_write_routes_to_region() -> anyhow::Result<()> {
        let (sim, domain, _ep, _cq) = setup();
        let mr_cq = domain.open_cq(&CqAttr::new(CqFormat::Data), 0)?;
        let mr_cntr = domain.counter();
        let mr = domain.reg_mr(0x5000, 4096, 0x77);
        mr.bind_cq(&mr_cq);
        mr.bind_cntr(&mr_cntr);

        sim.remote_write(&mr, 0xdead, 64);
        sim.remote_read(&mr, 32);
        domain.progress()?;

        let Some(Completion::Data(w)) = mr_cq.read_entry()? else {
            panic!("expected a data completion");
        };
        assert_eq!(w.op_context, 0x77);
        assert_eq!(w.data, 0xdead);
        assert_eq!(w.len, 64);
        let flags = CompletionFlags::from_bits_retain(w.flags);
        assert!(flags.contains(CompletionFlags::REMOTE_WRITE | CompletionFlags::REMOTE_CQ_DATA));

        let Some(Completion::Data(r)) = mr_cq.read_entry()? else {
            panic!("expected a data completion");
        };
        assert!(CompletionFlags::from_bits_retain(r.flags).contains(CompletionFlags::REMOTE_READ));
        assert_eq!(mr_cntr.read(), 2);
        Ok(())
    }

    #[test]
    fn targeted_drain_stops_at_target() -> anyhow::Result<()> {
        let (sim, domain, ep, cq) = setup();
        let other = domain.open_cq(&CqAttr::new(CqFormat::Tagged), 0)?;
        let ep2 = domain.endpoint();
        ep2.bind_cq(&other, BindFlags::SEND)?;

        ep2.send(1, 0, 0, 0, Some(1))?;
        ep.send(1, 0, 0, 0, Some(2))?;
        ep2.send(1, 0, 0, 0, Some(3))?;
        while sim.complete_next(Outcome::ok(0)).is_some() {}

        assert_eq!(poll_mq(&domain, Some(&cq))?, 1);
        assert_eq!(sim.ready(), 1);
        assert_eq!(other.queued(), 1);
        assert_eq!(cq.queued(), 1);

        assert_eq!(poll_mq(&domain, None)?, 0);
        assert_eq!(sim.ready(), 0);
        assert_eq!(other.queued(), 2);
        Ok(())
    }

    #[test]
    fn transport_failures_abort_the_drain() -> anyhow::Result<()> {
        let (sim, domain, ep, _cq) = setup();
        ep.send(1, 0, 0, 0, Some(1))?;
        sim.complete_next(Outcome::ok(0));

        sim.fail_next_peek(TransportStatus::EpDeviceFailure);
        assert!(matches!(
            poll_mq(&domain, None),
            Err(crate::fabric::error::Error::Transport(TransportStatus::EpDeviceFailure))
        ));
        // The completion is still there for the next drain.
        assert_eq!(sim.ready(), 1);

        sim.fail_next_peek(TransportStatus::MqNoCompletions);
        assert_eq!(poll_mq(&domain, None)?, 0);
        assert_eq!(sim.ready(), 1);
        Ok(())
    }

    #[test]
    fn receive_source_resolves() -> anyhow::Result<()> {
        let (sim, _domain, ep, cq) = setup();
        sim.add_peer(9, 0x900);
        ep.recv(0, 0, 0x3000, 64, Some(5))?;
        ep.recv(0, 0, 0x3000, 64, Some(6))?;
        sim.complete_next(Outcome::ok(8).tag(PSMX_MSG_BIT | 9));
        sim.complete_next(Outcome::ok(8).tag(PSMX_MSG_BIT | 10));

        let mut buf = [0u8; CqTaggedEntry::SIZE];
        assert_eq!(cq.read_from(&mut buf)?, (CqTaggedEntry::SIZE, 0x900));
        let (n, addr) = cq.read_from(&mut buf)?;
        assert_eq!(n, CqTaggedEntry::SIZE);
        assert_eq!(addr, crate::fabric::type_alias::FI_ADDR_UNSPEC);
        Ok(())
    }
}
