// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection to a log server and the request/response plumbing over it

use bytes::{BufMut, Bytes, BytesMut};
use gdp_core::datum::signed_bytes;
use gdp_core::{
    Datum, ErrorKind, GdpError, GdpName, IoMode, Metadata, Recno, Signer, SystemClock, Timestamp,
};
use gdp_engine::{Handle, HandleCache, HandleRef, Lookup, RequestState};
use gdp_protocol::{encode, read_pdu, Command, Pdu, ProtocolError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::log::{Log, LogInfo};
use crate::subscription::{Subscription, SubscriptionEvent};

/// Distinguishes clients started in the same process and instant
static CLIENT_SEQ: AtomicU64 = AtomicU64::new(0);

struct Pending {
    state: RequestState,
    reply: oneshot::Sender<Pdu>,
}

struct SubRoute {
    log: GdpName,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
}

#[derive(Default)]
struct Routes {
    pending: HashMap<u32, Pending>,
    subs: HashMap<u32, SubRoute>,
    closed: bool,
}

struct Shared {
    me: GdpName,
    config: ClientConfig,
    out: mpsc::UnboundedSender<Bytes>,
    next_rid: AtomicU32,
    routes: Mutex<Routes>,
    cache: HandleCache<LogInfo, SystemClock>,
    placeholders: AtomicU64,
}

impl Shared {
    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_rid(&self) -> u32 {
        self.next_rid.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, pdu: &Pdu) -> Result<(), ClientError> {
        let bytes = encode(pdu)?;
        self.out.send(bytes).map_err(|_| ClientError::Disconnected)
    }

    /// Expect a response on `rid`
    fn register(&self, rid: u32, cmd: Command) -> Result<oneshot::Receiver<Pdu>, ClientError> {
        let mut routes = self.routes();
        if routes.closed {
            return Err(ClientError::Disconnected);
        }
        let mut state = RequestState::Free;
        state.transition(RequestState::Active).map_err(GdpError::from)?;
        state.transition(RequestState::Waiting).map_err(GdpError::from)?;
        let (reply, rx) = oneshot::channel();
        if routes.pending.insert(rid, Pending { state, reply }).is_some() {
            debug!(rid, %cmd, "replaced stale waiter");
        }
        Ok(rx)
    }

    fn forget(&self, rid: u32) {
        self.routes().pending.remove(&rid);
    }

    /// Hand an incoming frame to whoever is waiting for it
    fn route(&self, pdu: Pdu) {
        if pdu.cmd == Command::Keepalive {
            self.answer_probe(&pdu);
            return;
        }
        let Some(rid) = pdu.rid else {
            debug!(cmd = %pdu.cmd, "ignoring frame without request id");
            return;
        };

        let mut routes = self.routes();
        if let Some(mut pending) = routes.pending.remove(&rid) {
            drop(routes);
            if let Err(e) = pending.state.transition(RequestState::Active) {
                warn!(rid, "response in unexpected state: {}", e);
            }
            // The waiter may have timed out and gone away
            let _ = pending.reply.send(pdu);
            return;
        }

        let Some(route) = routes.subs.get(&rid) else {
            debug!(rid, cmd = %pdu.cmd, "response for unknown request");
            return;
        };
        let Some(event) = SubscriptionEvent::from_pdu(pdu) else {
            return;
        };
        let last = event.is_final();
        let delivered = route.events.send(event).is_ok();
        if last || !delivered {
            routes.subs.remove(&rid);
        }
    }

    /// The daemon checks on a quiet subscription; tell it we are still here
    fn answer_probe(&self, probe: &Pdu) {
        let log = match probe.rid.and_then(|rid| self.routes().subs.get(&rid).map(|r| r.log)) {
            Some(log) => log,
            None => {
                debug!(rid = ?probe.rid, "probe for unknown subscription");
                return;
            }
        };
        let ping = Pdu::new(Command::Ping, log, self.me).with_rid(self.next_rid());
        if let Err(e) = self.send(&ping) {
            debug!(log = %log, "could not answer probe: {}", e);
        }
    }

    /// Fail everything outstanding once the connection is gone
    fn disconnected(&self) {
        let subs = {
            let mut routes = self.routes();
            routes.closed = true;
            routes.pending.clear();
            std::mem::take(&mut routes.subs)
        };
        for (_, route) in subs {
            let _ = route.events.send(SubscriptionEvent::Shutdown(GdpError::new(
                ErrorKind::RoutingFailure,
                "connection to daemon closed",
            )));
        }
    }
}

/// How an invocation reacts to failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Standard,
    /// Routing failures end the request at once
    FailFast,
}

/// Whether a request whose reply never arrived can be sent again.
///
/// The daemon may have acted on the first copy: an append without an
/// expected recno would be stored twice, a subscription would be started
/// twice, and a create would come back as a conflict.
fn resendable(pdu: &Pdu) -> bool {
    match pdu.cmd {
        Command::Append => pdu.recno.is_some(),
        Command::Create | Command::Subscribe | Command::Multiread => false,
        _ => true,
    }
}

/// A connection to one log server
pub struct GdpClient {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl GdpClient {
    /// Connect over TCP and say hello
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let stream = tokio::time::timeout(config.invoke_timeout, TcpStream::connect(&config.router))
            .await
            .map_err(|_| ClientError::TimedOut { attempts: 1 })??;
        stream.set_nodelay(true)?;
        let client = Self::from_stream(stream, config);
        client.hello().await?;
        Ok(client)
    }

    /// Run the protocol over an already-connected stream
    pub fn from_stream<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let (out, mut rx) = mpsc::unbounded_channel::<Bytes>();

        let me = match &config.name {
            Some(alias) => GdpName::parse_or_alias(alias),
            None => generated_name(),
        };
        let shared = Arc::new(Shared {
            me,
            config,
            out,
            next_rid: AtomicU32::new(1),
            routes: Mutex::new(Routes::default()),
            cache: HandleCache::new(SystemClock),
            placeholders: AtomicU64::new(0),
        });

        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if let Err(e) = writer.write_all(&bytes).await {
                    debug!("write to daemon failed: {}", e);
                    break;
                }
            }
        });

        let routing = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            let mut buf = BytesMut::new();
            loop {
                match read_pdu(&mut reader, &mut buf).await {
                    Ok(pdu) => routing.route(pdu),
                    Err(ProtocolError::ConnectionClosed) => {
                        debug!("daemon closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("dropping connection to daemon: {}", e);
                        break;
                    }
                }
            }
            routing.disconnected();
        });

        Self { shared, reader }
    }

    /// Name this client sends requests from
    pub fn name(&self) -> GdpName {
        self.shared.me
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Logs this client currently has handles for
    pub fn cached_logs(&self) -> usize {
        self.shared.cache.len()
    }

    fn request(&self, cmd: Command, dst: GdpName) -> Pdu {
        Pdu::new(cmd, dst, self.shared.me)
    }

    /// Send a request and wait for its response, retrying as configured.
    ///
    /// A NAK becomes an error. Client-fault NAKs are never retried, and a
    /// request that may have taken effect is not resent after a timeout.
    async fn invoke(&self, pdu: Pdu, retry: Retry) -> Result<Pdu, ClientError> {
        let rid = match pdu.rid {
            Some(rid) => rid,
            None => self.shared.next_rid(),
        };
        let pdu = pdu.with_rid(rid);
        let attempts = self.shared.config.invoke_retries.max(1);
        let mut last = ClientError::TimedOut { attempts };

        for attempt in 1..=attempts {
            let rx = self.shared.register(rid, pdu.cmd)?;
            if let Err(e) = self.shared.send(&pdu) {
                self.shared.forget(rid);
                return Err(e);
            }
            let reply = match tokio::time::timeout(self.shared.config.invoke_timeout, rx).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => return Err(ClientError::Disconnected),
                Err(_) => {
                    self.shared.forget(rid);
                    debug!(rid, attempt, cmd = %pdu.cmd, "request timed out");
                    if !resendable(&pdu) {
                        return Err(ClientError::TimedOut { attempts: attempt });
                    }
                    last = ClientError::TimedOut { attempts };
                    continue;
                }
            };

            let Some(kind) = reply.cmd.error_kind() else {
                return Ok(reply);
            };
            let err = GdpError::new(kind, nak_message(&reply));
            let fail_fast = retry == Retry::FailFast && kind == ErrorKind::RoutingFailure;
            if !kind.is_retryable() || fail_fast {
                return Err(err.into());
            }
            debug!(rid, attempt, cmd = %pdu.cmd, "retrying after {}", err);
            last = err.into();
        }
        Err(last)
    }

    async fn hello(&self) -> Result<(), ClientError> {
        self.invoke(self.request(Command::Hello, GdpName::ZERO), Retry::Standard)
            .await?;
        Ok(())
    }

    /// Create a log on `server`. A zero `name` lets the server derive it
    /// from the metadata.
    pub async fn create_log(
        &self,
        server: GdpName,
        name: GdpName,
        metadata: &Metadata,
    ) -> Result<Log, ClientError> {
        // Registered under a placeholder until the reply says what it is called
        let n = self.shared.placeholders.fetch_add(1, Ordering::Relaxed);
        let placeholder = GdpName::from_alias(&format!("{}#create-{}", self.shared.me, n));
        let handle = Handle::new(placeholder, IoMode::ReadAppend, LogInfo::new(metadata.clone(), 0));
        let lease = self.shared.cache.insert(handle).map_err(GdpError::from)?;

        let mut payload = BytesMut::with_capacity(name.as_bytes().len() + metadata.body_len());
        payload.put_slice(name.as_bytes());
        payload.put_slice(&metadata.serialize());
        let reply = self
            .invoke(
                self.request(Command::Create, server).with_data(payload.freeze()),
                Retry::Standard,
            )
            .await;

        let reply = match reply {
            Ok(reply) if reply.cmd == Command::AckCreated => reply,
            Ok(reply) => {
                self.discard(lease);
                return Err(ClientError::UnexpectedResponse(reply.cmd));
            }
            Err(e) => {
                self.discard(lease);
                // On CREATE a conflict can only mean the name is taken
                return Err(match e {
                    ClientError::Gdp(e) if e.kind == ErrorKind::SequenceError => {
                        GdpError::new(ErrorKind::AlreadyExists, e.message).into()
                    }
                    other => other,
                });
            }
        };

        if let Err(e) = self.shared.cache.rename(&lease, reply.src) {
            self.discard(lease);
            return Err(GdpError::from(e).into());
        }
        debug!(log = %reply.src, "created");
        Ok(Log::new(lease))
    }

    /// Open a log, sharing the handle with earlier opens of the same name.
    ///
    /// A cached handle whose mode already covers `mode` is returned without
    /// asking the server.
    pub async fn open_log(&self, name: GdpName, mode: IoMode) -> Result<Log, ClientError> {
        let cmd = match mode {
            IoMode::ReadOnly => Command::OpenRo,
            IoMode::AppendOnly => Command::OpenAo,
            IoMode::ReadAppend => Command::OpenRa,
            IoMode::None => {
                return Err(GdpError::new(ErrorKind::BadIoMode, "open needs a mode").into())
            }
        };
        if let Some(lease) = self.shared.cache.get(&name) {
            if lease.iomode().allows(mode) {
                return Ok(Log::new(lease));
            }
        }

        let retry = if self.shared.config.open_failfast {
            Retry::FailFast
        } else {
            Retry::Standard
        };
        let reply = self.invoke(self.request(cmd, name), retry).await?;
        let count = reply.recno.unwrap_or(0);

        let lease = match self.shared.cache.get_or_create(&name, mode) {
            Lookup::Hit(lease) => lease,
            Lookup::Miss => {
                let metadata = Metadata::deserialize(&reply.data)?;
                let handle = Handle::new(name, mode, LogInfo::new(metadata, count));
                self.shared.cache.insert(handle).map_err(GdpError::from)?
            }
        };
        lease.inner().observe(count);
        debug!(log = %name, %mode, count, "opened");
        Ok(Log::new(lease))
    }

    /// Open a log for appending and sign every record through `signer`
    pub async fn open_signed(
        &self,
        name: GdpName,
        mode: IoMode,
        signer: Arc<dyn Signer>,
    ) -> Result<Log, ClientError> {
        let log = self.open_log(name, mode).await?;
        log.set_signer(signer);
        Ok(log)
    }

    /// Append one record; returns it with the number and commit time the
    /// daemon assigned.
    ///
    /// Signed appends name the record number they expect, since the
    /// signature covers it.
    pub async fn append(&self, log: &Log, data: impl Into<Bytes>) -> Result<Datum, ClientError> {
        if !log.iomode().can_append() {
            return Err(GdpError::new(
                ErrorKind::BadIoMode,
                format!("{} is open {}", log.name(), log.iomode()),
            )
            .into());
        }
        let mut datum = Datum::new(data);
        let mut pdu = self
            .request(Command::Append, log.name())
            .with_data(datum.data.clone());
        if let Some(signer) = log.info().signer() {
            let recno = log.count() + 1;
            let sig = signer.sign(&signed_bytes(recno, &datum.data))?;
            pdu = pdu.with_recno(recno).with_sig(Some(sig.clone()));
            datum.sig = Some(sig);
        }

        let reply = self.invoke(pdu, Retry::Standard).await?;
        datum.recno = reply.recno.unwrap_or(0);
        datum.ts = reply.ts.unwrap_or(Timestamp::NONE);
        log.info().observe(datum.recno);
        self.shared.cache.touch(log.lease());
        Ok(datum)
    }

    /// Read one record; non-positive numbers count back from the end
    pub async fn read(&self, log: &Log, recno: Recno) -> Result<Datum, ClientError> {
        let reply = self
            .invoke(
                self.request(Command::Read, log.name()).with_recno(recno),
                Retry::Standard,
            )
            .await?;
        if reply.cmd != Command::AckContent {
            return Err(ClientError::UnexpectedResponse(reply.cmd));
        }
        let datum = Datum {
            recno: reply.recno.unwrap_or(recno),
            ts: reply.ts.unwrap_or(Timestamp::NONE),
            data: reply.data,
            sig: reply.sig,
        };
        log.info().observe(datum.recno);
        self.shared.cache.touch(log.lease());
        Ok(datum)
    }

    /// Follow a log from `start`: existing records first, then new appends.
    /// `count` of 0 means no limit.
    pub async fn subscribe(
        &self,
        log: &Log,
        start: Recno,
        count: u32,
        timeout: Option<Duration>,
    ) -> Result<Subscription, ClientError> {
        self.start_subscription(Command::Subscribe, log, start, count, timeout)
            .await
    }

    /// Stream up to `count` existing records from `start`, then end
    pub async fn multiread(
        &self,
        log: &Log,
        start: Recno,
        count: u32,
    ) -> Result<Subscription, ClientError> {
        self.start_subscription(Command::Multiread, log, start, count, None)
            .await
    }

    async fn start_subscription(
        &self,
        cmd: Command,
        log: &Log,
        start: Recno,
        count: u32,
        timeout: Option<Duration>,
    ) -> Result<Subscription, ClientError> {
        let count = i32::try_from(count).map_err(|_| {
            GdpError::bad_request(format!("record count {} out of range", count))
        })?;
        let mut payload = BytesMut::with_capacity(20);
        payload.put_i32(count);
        if let Some(timeout) = timeout {
            payload.put_i64(i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX));
            payload.put_u32(timeout.subsec_nanos());
            payload.put_u32(0);
        }

        let rid = self.shared.next_rid();
        let (events, rx) = mpsc::unbounded_channel();
        // Deliveries can follow the ack immediately; route them from the start
        self.shared.routes().subs.insert(
            rid,
            SubRoute {
                log: log.name(),
                events,
            },
        );
        let pdu = self
            .request(cmd, log.name())
            .with_rid(rid)
            .with_recno(start)
            .with_data(payload.freeze());
        match self.invoke(pdu, Retry::Standard).await {
            Ok(_) => Ok(Subscription::new(rid, log.name(), rx)),
            Err(e) => {
                self.shared.routes().subs.remove(&rid);
                Err(e)
            }
        }
    }

    /// End this client's subscriptions on a log. Each stream receives its
    /// end-of-subscription event.
    pub async fn unsubscribe(&self, log: &Log) -> Result<(), ClientError> {
        self.invoke(self.request(Command::Unsubscribe, log.name()), Retry::Standard)
            .await?;
        Ok(())
    }

    pub async fn get_metadata(&self, log: &Log) -> Result<Metadata, ClientError> {
        let reply = self
            .invoke(self.request(Command::GetMetadata, log.name()), Retry::Standard)
            .await?;
        Ok(Metadata::deserialize(&reply.data)?)
    }

    /// Give back a lease. The daemon is told once the last lease on the log
    /// is closed; returns the record count known at that point.
    pub async fn close(&self, log: Log) -> Result<Recno, ClientError> {
        let mut count = log.count();
        if log.is_last() {
            let reply = self
                .invoke(self.request(Command::Close, log.name()), Retry::Standard)
                .await?;
            count = reply.recno.unwrap_or(count);
        }
        self.discard(log.into_lease());
        Ok(count)
    }

    /// Drop a lease and evict the handle if nobody else holds it
    fn discard(&self, lease: HandleRef<LogInfo>) {
        drop(lease);
        let evicted = self.shared.cache.reclaim(Duration::ZERO);
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "released log handles");
        }
    }
}

impl Drop for GdpClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.disconnected();
    }
}

impl std::fmt::Debug for GdpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GdpClient")
            .field("name", &self.shared.me)
            .field("router", &self.shared.config.router)
            .finish_non_exhaustive()
    }
}

fn nak_message(reply: &Pdu) -> String {
    if reply.data.is_empty() {
        format!("{} from {}", reply.cmd, reply.src)
    } else {
        String::from_utf8_lossy(&reply.data).into_owned()
    }
}

fn generated_name() -> GdpName {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = CLIENT_SEQ.fetch_add(1, Ordering::Relaxed);
    GdpName::digest(format!("gdp-client:{}:{}:{}", std::process::id(), nanos, seq).as_bytes())
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
