// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::{Args, Config};
use crate::lifecycle::startup;
use bytes::{BufMut, BytesMut};
use gdp_core::metadata::ids;
use gdp_core::{GdpName, Metadata, Params};
use gdp_protocol::{read_pdu_timeout, write_pdu, Command, DEFAULT_TIMEOUT, HEADER_LEN};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::oneshot;

const WAIT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    name: GdpName,
    stop: Option<oneshot::Sender<()>>,
    _dir: TempDir,
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn run_daemon() -> Running {
    let dir = tempfile::tempdir().unwrap();
    let args = Args {
        log_dir: Some(dir.path().to_path_buf()),
        ..Args::default()
    };
    let mut config = Config::from_params(&Params::new(), &args).unwrap();
    config.listen = "127.0.0.1:0".parse().unwrap();
    let mut daemon = startup(&config).await.unwrap();
    let addr = daemon.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(async move {
        daemon
            .run_until(async {
                let _ = stopped.await;
            })
            .await;
        let _ = daemon.shutdown();
    });
    Running {
        addr,
        name: config.engine.name,
        stop: Some(stop),
        _dir: dir,
    }
}

struct Client {
    reader: OwnedReadHalf,
    writer: tokio::net::tcp::OwnedWriteHalf,
    buf: BytesMut,
    me: GdpName,
    rid: u32,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader,
            writer,
            buf: BytesMut::new(),
            me: GdpName::from_alias("server-test-client"),
            rid: 0,
        }
    }

    async fn send(&mut self, pdu: Pdu) -> u32 {
        self.rid += 1;
        write_pdu(&mut self.writer, &pdu.with_rid(self.rid), DEFAULT_TIMEOUT)
            .await
            .unwrap();
        self.rid
    }

    async fn recv(&mut self) -> Pdu {
        read_pdu_timeout(&mut self.reader, &mut self.buf, WAIT)
            .await
            .unwrap()
    }

    async fn call(&mut self, pdu: Pdu) -> Pdu {
        let rid = self.send(pdu).await;
        let reply = self.recv().await;
        assert_eq!(reply.rid, Some(rid));
        reply
    }

    async fn create(&mut self, daemon: GdpName, tag: &str) -> GdpName {
        let md = Metadata::new().with(ids::XID, tag.to_string()).unwrap();
        let mut payload = BytesMut::new();
        payload.put_slice(GdpName::ZERO.as_bytes());
        payload.put_slice(&md.serialize());
        let me = self.me;
        let reply = self
            .call(Pdu::new(Command::Create, daemon, me).with_data(payload.freeze()))
            .await;
        assert_eq!(reply.cmd, Command::AckCreated, "{:?}", reply);
        reply.src
    }
}

#[tokio::test]
async fn hello_over_tcp() {
    let daemon = run_daemon().await;
    let mut client = Client::connect(daemon.addr).await;
    let me = client.me;
    let reply = client.call(Pdu::new(Command::Hello, daemon.name, me)).await;
    assert_eq!(reply.cmd, Command::AckSuccess);
    assert_eq!(reply.dst, me);
}

#[tokio::test]
async fn append_and_read_over_tcp() {
    let daemon = run_daemon().await;
    let mut client = Client::connect(daemon.addr).await;
    let me = client.me;
    let log = client.create(daemon.name, "server.rw").await;

    for data in ["one", "two"] {
        let reply = client
            .call(Pdu::new(Command::Append, log, me).with_data(data))
            .await;
        assert_eq!(reply.cmd, Command::AckCreated);
    }
    let reply = client
        .call(Pdu::new(Command::Read, log, me).with_recno(-1))
        .await;
    assert_eq!(reply.cmd, Command::AckContent);
    assert_eq!(reply.recno, Some(2));
    assert_eq!(&reply.data[..], b"two");
}

#[tokio::test]
async fn pipelined_requests_are_answered_in_order() {
    let daemon = run_daemon().await;
    let mut client = Client::connect(daemon.addr).await;
    let me = client.me;
    let log = client.create(daemon.name, "server.pipeline").await;

    let mut rids = Vec::new();
    for i in 0..10 {
        rids.push(
            client
                .send(Pdu::new(Command::Append, log, me).with_data(format!("r{}", i)))
                .await,
        );
    }
    for (i, rid) in rids.into_iter().enumerate() {
        let reply = client.recv().await;
        assert_eq!(reply.rid, Some(rid));
        assert_eq!(reply.recno, Some(i as i64 + 1));
    }
}

#[tokio::test]
async fn subscription_is_delivered_to_another_connection() {
    let daemon = run_daemon().await;
    let mut writer = Client::connect(daemon.addr).await;
    let mut reader = Client::connect(daemon.addr).await;
    let log = writer.create(daemon.name, "server.subscribe").await;

    let mut payload = BytesMut::new();
    payload.put_i32(1);
    let me = reader.me;
    let ack = reader
        .call(
            Pdu::new(Command::Subscribe, log, me)
                .with_recno(1)
                .with_data(payload.freeze()),
        )
        .await;
    assert_eq!(ack.cmd, Command::AckSuccess);

    let me = writer.me;
    writer
        .call(Pdu::new(Command::Append, log, me).with_data("hello"))
        .await;

    let delivery = reader.recv().await;
    assert_eq!(delivery.cmd, Command::AckContent);
    assert_eq!(delivery.rid, ack.rid);
    assert_eq!(&delivery.data[..], b"hello");
    let end = reader.recv().await;
    assert_eq!(end.cmd, Command::AckDeleted);
}

#[tokio::test]
async fn bad_version_closes_connection() {
    let daemon = run_daemon().await;
    let mut client = Client::connect(daemon.addr).await;
    let mut frame = vec![0u8; HEADER_LEN];
    frame[0] = 99;
    client.writer.write_all(&frame).await.unwrap();

    let err = read_pdu_timeout(&mut client.reader, &mut client.buf, WAIT)
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::ConnectionClosed);
}

#[tokio::test]
async fn ping_is_answered_while_a_large_backlog_drains() {
    let daemon = run_daemon().await;
    let mut client = Client::connect(daemon.addr).await;
    let me = client.me;
    let log = client.create(daemon.name, "server.backlog").await;
    for i in 0..300 {
        client
            .send(Pdu::new(Command::Append, log, me).with_data(format!("r{}", i)))
            .await;
    }
    for _ in 0..300 {
        assert_eq!(client.recv().await.cmd, Command::AckCreated);
    }

    let mut payload = BytesMut::new();
    payload.put_i32(0);
    let sub_rid = client
        .send(
            Pdu::new(Command::Subscribe, log, me)
                .with_recno(1)
                .with_data(payload.freeze()),
        )
        .await;
    let ping_rid = client.send(Pdu::new(Command::Ping, log, me)).await;

    // Deliveries and the ping reply interleave; both must arrive
    let mut delivered = Vec::new();
    let mut pinged = false;
    while !pinged || delivered.len() < 300 {
        let pdu = client.recv().await;
        match pdu.rid {
            Some(rid) if rid == ping_rid => {
                assert_eq!(pdu.cmd, Command::AckSuccess);
                pinged = true;
            }
            Some(rid) if rid == sub_rid && pdu.cmd == Command::AckContent => {
                delivered.push(pdu.recno.unwrap());
            }
            Some(rid) if rid == sub_rid => assert_eq!(pdu.cmd, Command::AckSuccess),
            other => panic!("unexpected frame {:?} with rid {:?}", pdu.cmd, other),
        }
    }
    assert_eq!(delivered, (1..=300).collect::<Vec<_>>());
}

#[tokio::test]
async fn channel_send_fails_once_writer_is_gone() {
    let (tx, rx) = mpsc::channel(4);
    let channel = TcpChannel::new(7, "127.0.0.1:1".parse().unwrap(), tx);
    let pdu = Pdu::new(Command::AckSuccess, GdpName::ZERO, GdpName::ZERO);
    channel.send(&pdu).unwrap();
    drop(rx);
    let err = channel.send(&pdu).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RoutingFailure);
    assert_eq!(channel.id(), 7);
}

#[tokio::test]
async fn full_channel_refuses_frames_until_the_writer_catches_up() {
    let (tx, mut rx) = mpsc::channel(2);
    let channel = TcpChannel::new(3, "127.0.0.1:1".parse().unwrap(), tx);
    let pdu = Pdu::new(Command::AckContent, GdpName::ZERO, GdpName::ZERO);
    assert_eq!(channel.room(), Some(2));
    channel.send(&pdu).unwrap();
    channel.send(&pdu).unwrap();
    assert_eq!(channel.room(), Some(0));

    let err = channel.send(&pdu).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);

    rx.recv().await.unwrap();
    assert_eq!(channel.room(), Some(1));
    channel.send(&pdu).unwrap();
}
