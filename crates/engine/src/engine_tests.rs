// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::testing::{connection, fixture, fixture_with, metadata, wait_for, Fixture};
use crate::MemoryChannel;
use bytes::Bytes;
use gdp_core::metadata::ids;
use gdp_core::{FakeSigner, Signer};
use gdp_protocol::Pdu;
use proptest::prelude::*;

fn client() -> GdpName {
    GdpName::from_alias("client")
}

fn create_and_open(fx: &Fixture, tag: &str) -> (GdpName, HandleRef<LogState>) {
    let name = fx.engine.create_log(GdpName::ZERO, &metadata(tag)).unwrap();
    let handle = fx.engine.open_log(&name, IoMode::ReadAppend).unwrap();
    (name, handle)
}

fn append(fx: &Fixture, handle: &HandleRef<LogState>, data: &'static str) -> Recno {
    fx.engine
        .append(handle, Datum::new(data), None)
        .expect("append failed")
        .recno
}

fn request(fx: &Fixture, log: GdpName, start: Recno, count: u64) -> Request {
    let pdu = Pdu::new(Command::Subscribe, log, client()).with_rid(9);
    let mut req = fx.engine.pool.acquire(&pdu);
    req.next_recno = start;
    req.remaining = count;
    req
}

fn recnos(frames: &[Pdu]) -> Vec<Option<Recno>> {
    frames.iter().map(|p| p.recno).collect()
}

#[tokio::test]
async fn create_derives_name_caches_and_advertises() {
    let fx = fixture();
    let md = metadata("create");
    let name = fx.engine.create_log(GdpName::ZERO, &md).unwrap();
    assert_eq!(name, md.derive_name());
    assert!(fx.engine.cache().contains(&name));
    assert_eq!(*fx.advertised.names.lock().unwrap(), vec![name]);
}

#[tokio::test]
async fn create_twice_is_already_exists_even_after_reclaim() {
    let fx = fixture();
    let md = metadata("twice");
    fx.engine.create_log(GdpName::ZERO, &md).unwrap();
    let err = fx.engine.create_log(GdpName::ZERO, &md).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    fx.clock.advance(Duration::from_secs(600));
    assert_eq!(fx.engine.reclaim().len(), 1);
    let err = fx.engine.create_log(GdpName::ZERO, &md).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn create_with_unusable_public_key_leaves_nothing_behind() {
    let fx = fixture();
    let md = metadata("badkey").with(ids::PUBKEY, vec![3u8, 1]).unwrap();
    let err = fx.engine.create_log(GdpName::ZERO, &md).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(gdp_storage::LogStore::list(fx.dir.path()).unwrap().is_empty());
    assert!(fx.advertised.names.lock().unwrap().is_empty());

    // A retry fails the same way rather than finding a half-made log
    let err = fx.engine.create_log(GdpName::ZERO, &md).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    let err = fx.engine.open_log(&md.derive_name(), IoMode::ReadOnly).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn open_missing_log_is_not_found() {
    let fx = fixture();
    let err = fx
        .engine
        .open_log(&GdpName::from_alias("nope"), IoMode::ReadOnly)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn appends_are_numbered_and_stamped_by_the_engine_clock() {
    let fx = fixture();
    let (_, handle) = create_and_open(&fx, "stamp");
    fx.clock.advance(Duration::from_secs(5));
    let datum = fx.engine.append(&handle, Datum::new("a"), None).unwrap();
    assert_eq!(datum.recno, 1);
    assert_eq!(datum.ts.sec, 5);
    assert_eq!(append(&fx, &handle, "b"), 2);
    assert_eq!(append(&fx, &handle, "c"), 3);

    assert_eq!(fx.engine.read(&handle, 2).unwrap().data, Bytes::from_static(b"b"));
    assert_eq!(fx.engine.read(&handle, -1).unwrap().data, Bytes::from_static(b"c"));
    assert_eq!(fx.engine.read(&handle, 0).unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn append_with_wrong_expected_recno_is_rejected() {
    let fx = fixture();
    let (_, handle) = create_and_open(&fx, "seq");
    append(&fx, &handle, "a");
    let err = fx
        .engine
        .append(&handle, Datum::new("replay"), Some(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SequenceError);
    let err = fx
        .engine
        .append(&handle, Datum::new("gap"), Some(5))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SequenceError);
    assert_eq!(handle.inner().store().max_recno(), 1);

    let datum = fx.engine.append(&handle, Datum::new("b"), Some(2)).unwrap();
    assert_eq!(datum.recno, 2);
}

#[tokio::test]
async fn signature_policy_is_enforced_on_append() {
    let signer = FakeSigner::new("secret");
    let fx = fixture_with(
        |c| c.with_policy("required".parse().unwrap()),
        Arc::new(signer.clone()),
    );
    let md = metadata("signed")
        .with(ids::PUBKEY, signer.public_key().encode())
        .unwrap();
    let name = fx.engine.create_log(GdpName::ZERO, &md).unwrap();
    let handle = fx.engine.open_log(&name, IoMode::AppendOnly).unwrap();

    let err = fx.engine.append(&handle, Datum::new("a"), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureRequired);

    let sig = signer
        .sign(&gdp_core::datum::signed_bytes(1, b"a"))
        .unwrap();
    let datum = Datum::new("a").with_signature(sig.clone());
    assert_eq!(fx.engine.append(&handle, datum, None).unwrap().recno, 1);

    // Signature over recno 1 does not cover recno 2
    let err = fx
        .engine
        .append(&handle, Datum::new("a").with_signature(sig), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
    assert_eq!(fx.engine.read(&handle, 1).unwrap().sig.map(|s| s.md_alg), Some(3));
}

#[tokio::test]
async fn held_handles_survive_reclaim_and_idle_ones_do_not() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "reclaim");
    append(&fx, &handle, "a");

    fx.clock.advance(Duration::from_secs(3600));
    assert!(fx.engine.reclaim().is_empty());
    assert_eq!(handle.refcnt(), 1);

    fx.engine.cache().touch(&handle);
    drop(handle);
    fx.clock.advance(Duration::from_secs(60));
    assert!(fx.engine.reclaim().is_empty(), "released handles wait for the idle age");
    fx.clock.advance(Duration::from_secs(300));
    assert_eq!(fx.engine.reclaim(), vec![name]);

    let reopened = fx.engine.open_log(&name, IoMode::ReadOnly).unwrap();
    assert_eq!(reopened.inner().store().max_recno(), 1);
}

#[tokio::test]
async fn advertise_hosted_lists_logs_on_disk() {
    let fx = fixture();
    create_and_open(&fx, "one");
    create_and_open(&fx, "two");
    fx.advertised.names.lock().unwrap().clear();
    assert_eq!(fx.engine.advertise_hosted().unwrap(), 2);
    assert_eq!(fx.advertised.names.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn subscription_delivers_backlog_then_live_appends() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "live");
    for d in ["a", "b", "c"] {
        append(&fx, &handle, d);
    }
    let (conn, chan) = connection(1);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle.clone(),
        request(&fx, name, 2, 0),
        None,
        true,
    );
    assert_eq!(handle.inner().subscriber_count(), 1);
    append(&fx, &handle, "d");

    let sent = wait_for(&chan, 3).await;
    assert_eq!(recnos(&sent), vec![Some(2), Some(3), Some(4)]);
    let data: Vec<_> = sent.iter().map(|p| p.data.clone()).collect();
    assert_eq!(data, vec!["b", "c", "d"]);
    assert!(sent
        .iter()
        .all(|p| p.cmd == Command::AckContent && p.rid == Some(9) && p.dst == client()));
    assert_eq!(fx.engine.subscription_count(), 1);
}

#[tokio::test]
async fn backlog_that_satisfies_count_ends_at_once() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "count");
    for d in ["a", "b", "c"] {
        append(&fx, &handle, d);
    }
    let (conn, chan) = connection(1);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle.clone(),
        request(&fx, name, 1, 2),
        None,
        true,
    );
    let sent = wait_for(&chan, 3).await;
    assert_eq!(
        sent.iter().map(|p| p.cmd).collect::<Vec<_>>(),
        vec![Command::AckContent, Command::AckContent, Command::AckDeleted]
    );
    assert_eq!(fx.engine.subscription_count(), 0);
    assert_eq!(handle.inner().subscriber_count(), 0);
}

#[tokio::test]
async fn live_count_runs_out() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "future");
    let (conn, chan) = connection(1);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle.clone(),
        request(&fx, name, 1, 2),
        None,
        true,
    );
    for d in ["a", "b", "c"] {
        append(&fx, &handle, d);
    }
    let sent = wait_for(&chan, 3).await;
    assert_eq!(
        sent.iter().map(|p| p.cmd).collect::<Vec<_>>(),
        vec![Command::AckContent, Command::AckContent, Command::AckDeleted]
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(chan.len(), 3);
    assert_eq!(handle.inner().subscriber_count(), 0);
}

#[tokio::test]
async fn snapshot_sends_existing_records_then_ends() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "snapshot");
    for d in ["a", "b"] {
        append(&fx, &handle, d);
    }
    let (conn, chan) = connection(1);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle.clone(),
        request(&fx, name, 1, 0),
        None,
        false,
    );
    assert!(chan.is_empty(), "the backlog is sent by the delivery task");
    let sent = wait_for(&chan, 3).await;
    assert_eq!(
        sent.iter().map(|p| p.cmd).collect::<Vec<_>>(),
        vec![Command::AckContent, Command::AckContent, Command::AckDeleted]
    );
    assert_eq!(handle.inner().subscriber_count(), 0);
}

#[tokio::test]
async fn quiet_subscriptions_are_probed_then_dropped() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "keepalive");
    let (conn, chan) = connection(1);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle.clone(),
        request(&fx, name, 1, 0),
        None,
        true,
    );

    fx.clock.advance(Duration::from_secs(5));
    assert_eq!(fx.engine.sweep_subscriptions(), 0);

    fx.clock.advance(Duration::from_secs(6));
    assert_eq!(fx.engine.sweep_subscriptions(), 1);
    let sent = wait_for(&chan, 1).await;
    assert_eq!(sent[0].cmd, Command::Keepalive);
    assert_eq!(sent[0].src, name);

    // Already probed; nothing new until the dead interval
    fx.clock.advance(Duration::from_secs(20));
    assert_eq!(fx.engine.sweep_subscriptions(), 0);

    fx.clock.advance(Duration::from_secs(30));
    assert_eq!(fx.engine.sweep_subscriptions(), 1);
    let sent = wait_for(&chan, 2).await;
    assert_eq!(sent[1].cmd, Command::NakLostSubscription);
    assert_eq!(fx.engine.subscription_count(), 0);
}

#[tokio::test]
async fn refresh_postpones_the_probe() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "refresh");
    let (conn, _chan) = connection(4);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle,
        request(&fx, name, 1, 0),
        None,
        true,
    );
    fx.clock.advance(Duration::from_secs(9));
    assert_eq!(fx.engine.refresh_subscriptions(4, &name, &client()), 1);
    assert_eq!(fx.engine.refresh_subscriptions(5, &name, &client()), 0);
    fx.clock.advance(Duration::from_secs(9));
    assert_eq!(fx.engine.sweep_subscriptions(), 0);
}

#[tokio::test]
async fn subscription_timeout_expires() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "expiry");
    let (conn, chan) = connection(1);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle,
        request(&fx, name, 1, 0),
        Some(Duration::from_secs(3)),
        true,
    );
    fx.clock.advance(Duration::from_secs(4));
    assert_eq!(fx.engine.sweep_subscriptions(), 1);
    let sent = wait_for(&chan, 1).await;
    assert_eq!(sent[0].cmd, Command::AckDeleted);
}

#[tokio::test]
async fn dead_channel_ends_subscription_silently() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "closed");
    let (conn, chan) = connection(1);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle.clone(),
        request(&fx, name, 1, 0),
        None,
        true,
    );
    chan.close();
    append(&fx, &handle, "a");
    for _ in 0..200 {
        if fx.engine.subscription_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fx.engine.subscription_count(), 0);
    assert!(chan.is_empty());
}

#[tokio::test]
async fn disconnect_ends_only_that_connections_subscriptions() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "disconnect");
    let (gone, gone_chan) = connection(1);
    let (stays, stays_chan) = connection(2);
    for conn in [&gone, &stays] {
        fx.engine.subscribe(
            Arc::clone(conn.channel()),
            handle.clone(),
            request(&fx, name, 1, 0),
            None,
            true,
        );
    }
    fx.engine.disconnect(&gone);
    for _ in 0..200 {
        if fx.engine.subscription_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fx.engine.subscription_count(), 1);

    append(&fx, &handle, "a");
    assert_eq!(wait_for(&stays_chan, 1).await.len(), 1);
    assert!(gone_chan.is_empty());
}

#[tokio::test]
async fn shutdown_tells_subscribers_and_empties_cache() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "shutdown");
    let (conn, chan) = connection(1);
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle.clone(),
        request(&fx, name, 1, 0),
        None,
        true,
    );
    drop(handle);
    fx.engine.shutdown();
    let sent = wait_for(&chan, 1).await;
    assert_eq!(sent[0].cmd, Command::NakLostSubscription);
    assert!(fx.engine.cache().is_empty());
}

#[tokio::test]
async fn subscriber_sees_concurrent_appends_in_order() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "ordered");
    for _ in 0..10 {
        append(&fx, &handle, "early");
    }
    let (conn, chan) = connection(1);
    std::thread::scope(|s| {
        let writer = s.spawn(|| {
            for _ in 0..40 {
                append(&fx, &handle, "late");
            }
        });
        fx.engine.subscribe(
            Arc::clone(conn.channel()),
            handle.clone(),
            request(&fx, name, 1, 0),
            None,
            true,
        );
        writer.join().unwrap();
    });
    let sent = wait_for(&chan, 50).await;
    assert_eq!(
        recnos(&sent),
        (1..=50).map(Some).collect::<Vec<_>>(),
        "every record exactly once, in order"
    );
}

#[tokio::test]
async fn backlog_is_paced_by_channel_room() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "paced");
    for _ in 0..150 {
        append(&fx, &handle, "r");
    }
    let chan = Arc::new(MemoryChannel::bounded(1, 16));
    fx.engine.subscribe(
        chan.clone(),
        handle.clone(),
        request(&fx, name, 1, 0),
        None,
        false,
    );

    let mut got = Vec::new();
    for _ in 0..400 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(chan.len() <= 16);
        got.extend(chan.take());
        if got.last().is_some_and(|p| p.cmd == Command::AckDeleted) {
            break;
        }
    }
    assert_eq!(got.len(), 151);
    assert_eq!(
        recnos(&got[..150]),
        (1..=150).map(Some).collect::<Vec<_>>()
    );
    assert_eq!(got[150].cmd, Command::AckDeleted);
}

#[tokio::test]
async fn unsubscribe_is_honoured_while_backlog_waits_for_room() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "stalled");
    for _ in 0..10 {
        append(&fx, &handle, "r");
    }
    let chan = Arc::new(MemoryChannel::bounded(1, 4));
    fx.engine.subscribe(
        chan.clone(),
        handle.clone(),
        request(&fx, name, 1, 0),
        None,
        true,
    );
    assert_eq!(wait_for(&chan, 4).await.len(), 4);

    // The reader never drains, so there is no room for the end frame
    assert_eq!(fx.engine.unsubscribe(1, &name, &client()), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fx.engine.subscription_count(), 0);
    assert_eq!(handle.inner().subscriber_count(), 0);
    assert_eq!(recnos(&chan.take()), vec![Some(1), Some(2), Some(3), Some(4)]);
}

#[tokio::test]
async fn disconnect_ends_a_snapshot_stuck_behind_a_full_channel() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "stuck");
    for _ in 0..5 {
        append(&fx, &handle, "r");
    }
    let chan = Arc::new(MemoryChannel::bounded(1, 2));
    let conn = Connection::new(chan.clone());
    fx.engine.subscribe(
        Arc::clone(conn.channel()),
        handle.clone(),
        request(&fx, name, 1, 0),
        None,
        false,
    );
    assert_eq!(wait_for(&chan, 2).await.len(), 2);
    assert_eq!(fx.engine.subscription_count(), 1);

    fx.engine.disconnect(&conn);
    for _ in 0..200 {
        if fx.engine.subscription_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fx.engine.subscription_count(), 0);
    assert_eq!(chan.len(), 2);
}

#[tokio::test]
async fn live_append_to_full_channel_loses_the_subscription() {
    let fx = fixture();
    let (name, handle) = create_and_open(&fx, "overflow");
    let chan = Arc::new(MemoryChannel::bounded(1, 2));
    fx.engine.subscribe(
        chan.clone(),
        handle.clone(),
        request(&fx, name, 1, 0),
        None,
        true,
    );
    // Let the empty backlog finish so the appends below arrive live
    tokio::time::sleep(Duration::from_millis(20)).await;
    for _ in 0..3 {
        append(&fx, &handle, "r");
    }
    for _ in 0..200 {
        if fx.engine.subscription_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fx.engine.subscription_count(), 0);
    assert_eq!(recnos(&chan.take()), vec![Some(1), Some(2)]);
    assert_eq!(handle.inner().subscriber_count(), 0);
}

/// Frames a subscriber sees when `before` records exist, it subscribes
/// from `start` for `count`, and `after` more records are appended
fn subscribe_around_appends(before: usize, start: Recno, count: u64, after: usize) -> Vec<Pdu> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        let fx = fixture();
        let (name, handle) = create_and_open(&fx, "complete");
        for _ in 0..before {
            append(&fx, &handle, "before");
        }
        let (conn, chan) = connection(1);
        fx.engine.subscribe(
            Arc::clone(conn.channel()),
            handle.clone(),
            request(&fx, name, start, count),
            None,
            true,
        );
        for _ in 0..after {
            append(&fx, &handle, "after");
        }
        let total = (before + after) as Recno;
        let mut expected = (total - start + 1).max(0) as usize;
        if count > 0 && count as usize <= expected {
            expected = count as usize + 1;
        }
        wait_for(&chan, expected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        chan.take()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn subscribers_get_every_record_once_in_order(
        before in 0usize..30,
        start_back in 0usize..31,
        count in 0u64..12,
        after in 0usize..30,
    ) {
        let start = (before.saturating_sub(start_back) + 1) as Recno;
        let sent = subscribe_around_appends(before, start, count, after);

        let last = (before + after) as Recno;
        let mut want: Vec<Recno> = (start..=last).collect();
        let completes = count > 0 && count as usize <= want.len();
        if count > 0 {
            want.truncate(count as usize);
        }
        let got: Vec<Recno> = sent
            .iter()
            .filter(|p| p.cmd == Command::AckContent)
            .filter_map(|p| p.recno)
            .collect();
        prop_assert_eq!(got, want);

        let ends: Vec<_> = sent.iter().filter(|p| p.cmd != Command::AckContent).collect();
        if completes {
            prop_assert_eq!(ends.len(), 1);
            prop_assert_eq!(ends[0].cmd, Command::AckDeleted);
            prop_assert_eq!(ends[0].recno, Some(start + count as Recno));
        } else {
            prop_assert!(ends.is_empty(), "{:?}", ends);
        }
    }
}
