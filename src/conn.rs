use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use crate::ldap::Ldap;
use crate::protocol::{ItemSender, LdapCodec, LdapOp, MaybeControls, ResultSender};
use crate::result::{LdapError, LdapResult, LdapResultExt, Result};
use crate::search::SearchItem;
use crate::RequestId;

use bertlv::structures::{Null, Tag};

use futures_util::sink::SinkExt;
#[cfg(unix)]
use percent_encoding::percent_decode;
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_stream::StreamExt;
use tokio_util::codec::{Decoder, Framed};
use url::{self, Url};

/// Largest accepted incoming message, unless overridden in the settings.
const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug)]
enum ConnType {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for ConnType {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnType::Tcp(ts) => Pin::new(ts).poll_read(cx, buf),
            #[cfg(unix)]
            ConnType::Unix(us) => Pin::new(us).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ConnType {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ConnType::Tcp(ts) => Pin::new(ts).poll_write(cx, buf),
            #[cfg(unix)]
            ConnType::Unix(us) => Pin::new(us).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnType::Tcp(ts) => Pin::new(ts).poll_flush(cx),
            #[cfg(unix)]
            ConnType::Unix(us) => Pin::new(us).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnType::Tcp(ts) => Pin::new(ts).poll_shutdown(cx),
            #[cfg(unix)]
            ConnType::Unix(us) => Pin::new(us).poll_shutdown(cx),
        }
    }
}

/// Additional settings for an LDAP connection.
///
/// The structure is opaque for better extensibility. An instance with
/// default values is constructed by [`new()`](#method.new), and all
/// available settings can be replaced through a builder-like interface,
/// by calling the appropriate functions.
#[derive(Clone)]
pub struct LdapConnSettings {
    conn_timeout: Option<Duration>,
    max_frame_size: usize,
}

impl Default for LdapConnSettings {
    fn default() -> LdapConnSettings {
        LdapConnSettings {
            conn_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl LdapConnSettings {
    /// Create an instance of the structure with default settings.
    pub fn new() -> LdapConnSettings {
        LdapConnSettings {
            ..Default::default()
        }
    }

    /// Set the connection timeout. If a connetion to the server can't
    /// be established before the timeout expires, an error will be
    /// returned to the user. Defaults to `None`, meaning an infinite
    /// timeout.
    pub fn set_conn_timeout(mut self, timeout: Duration) -> Self {
        self.conn_timeout = Some(timeout);
        self
    }

    /// Set the maximum size of an incoming message, in bytes. A server
    /// response declaring a longer frame tears down the connection.
    /// Defaults to 8 MiB.
    pub fn set_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

#[allow(clippy::needless_doctest_main)]
/// Asynchronous connection to an LDAP server. __*__
///
/// In this version of the interface, opening a connection with [`new()`](#method.new)
/// will return a tuple consisting of the connection itself and an [`Ldap`](struct.Ldap.html)
/// handle for performing the LDAP operations. The connection must be spawned on the active
/// Tokio executor before using the handle. A convenience macro, [`drive!`](macro.drive.html), is
/// provided by the library. For the connection `conn`, it does the equivalent of:
///
/// ```rust,no_run
/// # use ldaptalk::LdapConnAsync;
/// # use log::warn;
/// # #[tokio::main]
/// # async fn main() {
/// # let (conn, _ldap) = LdapConnAsync::new("ldap://localhost:2389").await.unwrap();
/// tokio::spawn(async move {
///     if let Err(e) = conn.drive().await {
///         warn!("LDAP connection error: {}", e);
///     }
/// });
/// # }
/// ```
///
/// If you need custom connection lifecycle handling, use the [`drive()`](#method.drive) method
/// on the connection inside your own `async` block.
///
/// The `Ldap` handle can be freely cloned, with each clone capable of launching a separate
/// LDAP operation multiplexed on the original connection. Dropping the last handle will automatically
/// close the connection.
///
/// Some connections need additional parameters, but providing many separate functions to initialize
/// them, singly or in combination, would result in a cumbersome interface. Instead, connection
/// initialization is optimized for the expected most frequent usage, and additional customization
/// is possible through the [`LdapConnSettings`](struct.LdapConnSettings.html) struct, which can be
/// passed to [`with_settings()`](#method.with_settings).
pub struct LdapConnAsync {
    msgmap: Arc<Mutex<(i32, HashSet<i32>)>>,
    resultmap: HashMap<i32, ResultSender>,
    searchmap: HashMap<i32, ItemSender>,
    rx: mpsc::UnboundedReceiver<(RequestId, LdapOp, Tag, MaybeControls, ResultSender)>,
    stream: Framed<ConnType, LdapCodec>,
}

/// Drive the connection until its completion. __*__
///
/// See the introduction of [LdapConnAsync](struct.LdapConnAsync.html) for the exact code produced by
/// the macro.
#[macro_export]
macro_rules! drive {
    ($conn:expr) => {
        $crate::tokio::spawn(async move {
            if let Err(e) = $conn.drive().await {
                $crate::log::warn!("LDAP connection error: {}", e);
            }
        });
    };
}

impl LdapConnAsync {
    /// Open a connection to an LDAP server specified by `url`, using
    /// `settings` to specify additional parameters.
    pub async fn with_settings(settings: LdapConnSettings, url: &str) -> Result<(Self, Ldap)> {
        let url = Url::parse(url)?;
        Self::from_url_with_settings(settings, &url).await
    }

    /// Open a connection to an LDAP server specified by `url`.
    ///
    /// The `url` is an LDAP URL. The __ldap__ scheme, which uses a plain TCP
    /// connection, is always available. Unix-like platforms also support
    /// __ldapi__, using Unix domain sockets.
    ///
    /// The connection element in the returned tuple must be spawned on the current Tokio
    /// executor before using the `Ldap` element. See the introduction to this struct's
    /// documentation.
    pub async fn new(url: &str) -> Result<(Self, Ldap)> {
        Self::with_settings(LdapConnSettings::new(), url).await
    }

    /// Open a connection to an LDAP server specified by an already parsed `Url`, using
    /// `settings` to specify additional parameters.
    pub async fn from_url_with_settings(
        settings: LdapConnSettings,
        url: &Url,
    ) -> Result<(Self, Ldap)> {
        if url.scheme() == "ldapi" {
            LdapConnAsync::new_unix(url, settings).await
        } else {
            let mut settings = settings;
            let timeout = settings.conn_timeout.take();
            let conn_future = LdapConnAsync::new_tcp(url, settings);
            Ok(if let Some(timeout) = timeout {
                time::timeout(timeout, conn_future).await?
            } else {
                conn_future.await
            }?)
        }
    }

    /// Open a connection to an LDAP server specified by an already parsed `Url`.
    pub async fn from_url(url: &Url) -> Result<(Self, Ldap)> {
        Self::from_url_with_settings(LdapConnSettings::new(), url).await
    }

    #[cfg(unix)]
    async fn new_unix(url: &Url, settings: LdapConnSettings) -> Result<(Self, Ldap)> {
        let path = url.host_str().unwrap_or("");
        if path.is_empty() {
            return Err(LdapError::EmptyUnixPath);
        }
        if path.contains(':') {
            return Err(LdapError::PortInUnixPath);
        }
        let dec_path = percent_decode(path.as_bytes()).decode_utf8_lossy();
        let stream = UnixStream::connect(dec_path.as_ref()).await?;
        Ok(Self::conn_pair(ConnType::Unix(stream), &settings))
    }

    #[cfg(not(unix))]
    async fn new_unix(_url: &Url, _settings: LdapConnSettings) -> Result<(Self, Ldap)> {
        unimplemented!("no Unix domain sockets on non-Unix platforms");
    }

    async fn new_tcp(url: &Url, settings: LdapConnSettings) -> Result<(Self, Ldap)> {
        let mut port = 389;
        match url.scheme() {
            "ldap" => (),
            s => return Err(LdapError::UnknownScheme(String::from(s))),
        }
        if let Some(url_port) = url.port() {
            port = url_port;
        }
        let host_port = match url.host_str() {
            Some("") | None => format!("localhost:{}", port),
            Some(h) => format!("{}:{}", h, port),
        };
        let stream = TcpStream::connect(host_port.as_str()).await?;
        Ok(Self::conn_pair(ConnType::Tcp(stream), &settings))
    }

    fn conn_pair(ctype: ConnType, settings: &LdapConnSettings) -> (Self, Ldap) {
        let codec = LdapCodec {
            max_frame_size: settings.max_frame_size,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = LdapConnAsync {
            msgmap: Arc::new(Mutex::new((0, HashSet::new()))),
            resultmap: HashMap::new(),
            searchmap: HashMap::new(),
            rx,
            stream: codec.framed(ctype),
        };
        let ldap = Ldap {
            msgmap: conn.msgmap.clone(),
            tx,
            last_id: 0,
            timeout: None,
            controls: None,
            search_opts: None,
        };
        (conn, ldap)
    }

    /// Repeatedly poll the connection until it exits.
    pub async fn drive(self) -> Result<()> {
        self.turn().await
    }

    async fn turn(mut self) -> Result<()> {
        let res = loop {
            tokio::select! {
                op_tuple = self.rx.recv() => {
                    if let Some((id, op, tag, controls, tx)) = op_tuple {
                        if let LdapOp::Search(ref search_tx) = op {
                            self.searchmap.insert(id, search_tx.clone());
                        }
                        if let Err(e) = self.stream.send((id, tag, controls)).await {
                            warn!("socket send error: {}", e);
                            let _ = tx.send(Err(LdapError::ConnectionClosed));
                            break Err(LdapError::from(e));
                        } else {
                            // Internally issued Abandons drop their result
                            // receiver immediately, so a failed ack there is
                            // expected.
                            let ack_optional = matches!(op, LdapOp::Abandon(_));
                            match op {
                                LdapOp::Single => {
                                    self.resultmap.insert(id, tx);
                                    continue;
                                },
                                LdapOp::Search(_) => (),
                                LdapOp::Abandon(msgid) => {
                                    self.resultmap.remove(&msgid);
                                    self.searchmap.remove(&msgid);
                                    let mut msgmap = self.msgmap.lock().expect("msgmap mutex (abandon)");
                                    msgmap.1.remove(&msgid);
                                    msgmap.1.remove(&id);
                                },
                                LdapOp::Unbind => {
                                    if let Err(e) = self.stream.get_mut().shutdown().await {
                                        warn!("socket shutdown error: {}", e);
                                    }
                                    if let Err(e) = self.stream.close().await {
                                        warn!("socket close error: {}", e);
                                    }
                                },
                            }
                            if tx.send(Ok((Tag::Null(Null { ..Default::default() }), vec![]))).is_err()
                                && !ack_optional
                            {
                                warn!("ldap null result send error, op={}", id);
                            }
                        }
                    } else {
                        break Ok(());
                    }
                },
                resp = self.stream.next() => {
                    let (id, item) = match resp {
                        None => break Ok(()),
                        Some(Err(e)) => {
                            warn!("socket receive error: {}", e);
                            break Err(LdapError::from(e));
                        },
                        Some(Ok(resp)) => resp,
                    };
                    match item {
                        Ok((tag, controls)) => self.route_response(id, tag, controls),
                        Err(e) => self.fail_op(id, e),
                    }
                },
            };
        };
        self.fan_out_shutdown();
        res
    }

    fn route_response(&mut self, id: RequestId, tag: Tag, controls: Vec<crate::controls::Control>) {
        let protoop_id = match tag {
            Tag::StructureTag(ref protoop) => Some(protoop.id),
            _ => None,
        };
        if let Some(tx) = self.searchmap.get(&id) {
            let protoop = if let Tag::StructureTag(protoop) = tag {
                protoop
            } else {
                warn!("non-structural search response, op={}", id);
                return;
            };
            let (item, mut remove) = match protoop.id {
                4 | 25 => (SearchItem::Entry(protoop), false),
                5 => match LdapResultExt::try_from(Tag::StructureTag(protoop)) {
                    Ok(res_ext) => (SearchItem::Done(res_ext.0), true),
                    Err(e) => {
                        warn!("malformed search result, op={}: {}", id, e);
                        return;
                    }
                },
                19 => (SearchItem::Referral(protoop), false),
                other => {
                    warn!("unrecognized search op id: {}, op={}", other, id);
                    return;
                }
            };
            if let Err(e) = tx.send((item, controls)) {
                warn!("ldap search item send error, op={}: {:?}", id, e);
                remove = true;
            }
            if remove {
                self.searchmap.remove(&id);
                let mut msgmap = self.msgmap.lock().expect("msgmap mutex (search done)");
                msgmap.1.remove(&id);
            }
        } else if let Some(tx) = self.resultmap.remove(&id) {
            if tx.send(Ok((tag, controls))).is_err() {
                warn!("ldap result send error, op={}", id);
            }
            let mut msgmap = self.msgmap.lock().expect("msgmap mutex (stream rx)");
            msgmap.1.remove(&id);
        } else {
            // Entries and referrals for an abandoned search keep
            // arriving until the server processes the Abandon; they
            // aren't noteworthy.
            match protoop_id {
                Some(4) | Some(19) | Some(25) => (),
                _ => warn!("unmatched id: {}", id),
            }
        }
    }

    /// Deliver a response-level failure to the single operation it belongs
    /// to, leaving the connection and all other pending operations alone.
    fn fail_op(&mut self, id: RequestId, err: LdapError) {
        {
            let mut msgmap = self.msgmap.lock().expect("msgmap mutex (op failure)");
            msgmap.1.remove(&id);
        }
        if let Some(tx) = self.searchmap.remove(&id) {
            let res = LdapResult::from_local_error(&err);
            if tx.send((SearchItem::Done(res), vec![])).is_err() {
                warn!("ldap search failure send error, op={}", id);
            }
        } else if let Some(tx) = self.resultmap.remove(&id) {
            if tx.send(Err(err)).is_err() {
                warn!("ldap failure send error, op={}", id);
            }
        } else {
            warn!("response failure for unmatched id {}: {}", id, err);
        }
    }

    /// Deliver the connection loss to every operation still waiting for
    /// a result. Search item channels are dropped, which ends the
    /// corresponding streams.
    fn fan_out_shutdown(&mut self) {
        for (_, tx) in self.resultmap.drain() {
            let _ = tx.send(Err(LdapError::ConnectionClosed));
        }
        self.searchmap.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use bertlv::common::TagClass;
    use bertlv::structures::{ASNTag, Enumerated, OctetString, Sequence};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    async fn test_conn() -> (LdapConnAsync, Ldap, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (conn, ldap) =
            LdapConnAsync::conn_pair(ConnType::Tcp(client.unwrap()), &LdapConnSettings::new());
        (conn, ldap, server.unwrap().0)
    }

    fn done_op(rc: i64) -> Tag {
        Tag::StructureTag(
            Tag::Sequence(Sequence {
                id: 5,
                class: TagClass::Application,
                inner: vec![
                    Tag::Enumerated(Enumerated {
                        inner: rc,
                        ..Default::default()
                    }),
                    Tag::OctetString(OctetString::default()),
                    Tag::OctetString(OctetString::default()),
                ],
            })
            .into_structure(),
        )
    }

    #[tokio::test]
    async fn search_done_clears_bookkeeping() {
        let (mut conn, ldap, _peer) = test_conn().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.searchmap.insert(7, tx);
        ldap.msgmap.lock().unwrap().1.insert(7);
        conn.route_response(7, done_op(4), vec![]);
        match rx.recv().await {
            Some((SearchItem::Done(res), _)) => assert_eq!(res.rc, 4),
            other => panic!("unexpected item: {:?}", other),
        }
        assert!(!conn.searchmap.contains_key(&7));
        assert!(!ldap.msgmap.lock().unwrap().1.contains(&7));
    }

    #[tokio::test]
    async fn response_failure_hits_only_its_owner() {
        let (mut conn, ldap, _peer) = test_conn().await;
        let (tx1, rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        conn.resultmap.insert(1, tx1);
        conn.resultmap.insert(2, tx2);
        {
            let mut msgmap = ldap.msgmap.lock().unwrap();
            msgmap.1.insert(1);
            msgmap.1.insert(2);
        }
        conn.fail_op(
            1,
            LdapError::UnavailableCriticalExtension(String::from("1.2.3.4")),
        );
        let err = rx1.await.unwrap().unwrap_err();
        assert!(matches!(err, LdapError::UnavailableCriticalExtension(_)));
        assert_eq!(err.result_code(), 12);
        assert!(conn.resultmap.contains_key(&2));
        assert!(rx2.try_recv().is_err());
        let msgmap = ldap.msgmap.lock().unwrap();
        assert!(!msgmap.1.contains(&1));
        assert!(msgmap.1.contains(&2));
    }

    #[tokio::test]
    async fn search_failure_becomes_done_item() {
        let (mut conn, _ldap, _peer) = test_conn().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.searchmap.insert(3, tx);
        conn.fail_op(
            3,
            LdapError::UnavailableCriticalExtension(String::from("1.2.3.4")),
        );
        match rx.recv().await {
            Some((SearchItem::Done(res), _)) => {
                assert_eq!(res.rc, 12);
                assert!(res.text.contains("1.2.3.4"));
            }
            other => panic!("unexpected item: {:?}", other),
        }
        assert!(conn.searchmap.is_empty());
    }
}
