//! Wire-level tests of the message dispatcher, run against a scripted
//! in-process peer speaking raw BER over TCP.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ldaptalk::asn1::{
    ASNTag, Boolean, Enumerated, Integer, OctetString, PL, Sequence, StructureTag, Tag, TagClass,
    parse_tag, parse_uint, write,
};
use ldaptalk::exop::WhoAmI;
use ldaptalk::result::LdapError;
use ldaptalk::{Ldap, LdapConnAsync, Scope, SearchEntry};

async fn read_frame(sock: &mut TcpStream, buf: &mut Vec<u8>) -> StructureTag {
    loop {
        let parsed = match parse_tag(buf) {
            Ok((rest, tag)) => Some((rest.len(), tag)),
            Err(nom::Err::Incomplete(_)) => None,
            Err(e) => panic!("malformed frame from client: {:?}", e),
        };
        if let Some((rest_len, tag)) = parsed {
            let consumed = buf.len() - rest_len;
            buf.drain(..consumed);
            return tag;
        }
        let mut tmp = [0u8; 4096];
        let n = sock.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed mid-frame");
        buf.extend(&tmp[..n]);
    }
}

fn frame_msgid(frame: &StructureTag) -> i32 {
    let PL::C(ref children) = frame.payload else {
        panic!("envelope not constructed");
    };
    let PL::P(ref bytes) = children[0].payload else {
        panic!("message id not primitive");
    };
    let (_, id) = parse_uint(bytes).unwrap();
    id as i32
}

fn frame_op_id(frame: &StructureTag) -> u64 {
    let PL::C(ref children) = frame.payload else {
        panic!("envelope not constructed");
    };
    children[1].id
}

fn abandon_target(frame: &StructureTag) -> i32 {
    let PL::C(ref children) = frame.payload else {
        panic!("envelope not constructed");
    };
    let PL::P(ref bytes) = children[1].payload else {
        panic!("abandon op not primitive");
    };
    let (_, id) = parse_uint(bytes).unwrap();
    id as i32
}

fn envelope_parts(msgid: i32, op: Tag, ctrls: Option<Tag>) -> Vec<u8> {
    let mut inner = vec![
        Tag::Integer(Integer {
            inner: msgid as i64,
            ..Default::default()
        }),
        op,
    ];
    if let Some(ctrls) = ctrls {
        inner.push(ctrls);
    }
    let msg = Tag::Sequence(Sequence {
        inner,
        ..Default::default()
    });
    let mut buf = BytesMut::new();
    write::encode_into(&mut buf, msg.into_structure());
    buf.to_vec()
}

fn envelope(msgid: i32, op: Tag) -> Vec<u8> {
    envelope_parts(msgid, op, None)
}

fn critical_control(oid: &str) -> Tag {
    Tag::StructureTag(StructureTag {
        id: 0,
        class: TagClass::Context,
        payload: PL::C(vec![Tag::Sequence(Sequence {
            inner: vec![
                Tag::OctetString(OctetString {
                    inner: oid.as_bytes().to_vec(),
                    ..Default::default()
                }),
                Tag::Boolean(Boolean {
                    inner: true,
                    ..Default::default()
                }),
            ],
            ..Default::default()
        })
        .into_structure()]),
    })
}

fn result_op(app_id: u64, rc: i64, extra: Vec<Tag>) -> Tag {
    let mut inner = vec![
        Tag::Enumerated(Enumerated {
            inner: rc,
            ..Default::default()
        }),
        Tag::OctetString(OctetString::default()),
        Tag::OctetString(OctetString::default()),
    ];
    inner.extend(extra);
    Tag::Sequence(Sequence {
        class: TagClass::Application,
        id: app_id,
        inner,
    })
}

fn entry_op(dn: &str) -> Tag {
    Tag::Sequence(Sequence {
        class: TagClass::Application,
        id: 4,
        inner: vec![
            Tag::OctetString(OctetString {
                inner: dn.as_bytes().to_vec(),
                ..Default::default()
            }),
            Tag::Sequence(Sequence::default()),
        ],
    })
}

async fn connect(listener: &TcpListener) -> (TcpStream, Ldap) {
    let _ = env_logger::builder().is_test(true).try_init();
    let url = format!("ldap://{}", listener.local_addr().unwrap());
    let accept = listener.accept();
    let connect = LdapConnAsync::new(&url);
    let (server, client) = tokio::join!(accept, connect);
    let (sock, _) = server.unwrap();
    let (conn, ldap) = client.unwrap();
    ldaptalk::drive!(conn);
    (sock, ldap)
}

#[tokio::test]
async fn bind_response_routed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut sock, mut ldap) = connect(&listener).await;
    let server = tokio::spawn(async move {
        let mut buf = Vec::new();
        let frame = read_frame(&mut sock, &mut buf).await;
        assert_eq!(frame_op_id(&frame), 0);
        let reply = envelope(frame_msgid(&frame), result_op(1, 0, vec![]));
        sock.write_all(&reply).await.unwrap();
        sock
    });
    let res = ldap.simple_bind("cn=admin", "secret").await.unwrap();
    assert_eq!(res.rc, 0);
    server.await.unwrap();
}

#[tokio::test]
async fn out_of_order_responses_reach_their_callers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut sock, ldap) = connect(&listener).await;
    let server = tokio::spawn(async move {
        let mut buf = Vec::new();
        let first = read_frame(&mut sock, &mut buf).await;
        let second = read_frame(&mut sock, &mut buf).await;
        // reply in reverse order of arrival
        for frame in [second, first] {
            let msgid = frame_msgid(&frame);
            let val = Tag::OctetString(OctetString {
                class: TagClass::Context,
                id: 11,
                inner: format!("id{}", msgid).into_bytes(),
            });
            let reply = envelope(msgid, result_op(24, 0, vec![val]));
            sock.write_all(&reply).await.unwrap();
        }
        sock
    });
    async fn whoami(mut ldap: Ldap) -> (i32, String) {
        let res = ldap.extended(WhoAmI).await.unwrap();
        let (exop, _) = res.success().unwrap();
        let val = String::from_utf8(exop.val.unwrap()).unwrap();
        (ldap.last_id(), val)
    }
    let (a, b) = tokio::join!(whoami(ldap.clone()), whoami(ldap.clone()));
    assert_eq!(a.1, format!("id{}", a.0));
    assert_eq!(b.1, format!("id{}", b.0));
    assert_ne!(a.0, b.0);
    server.await.unwrap();
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut sock, mut ldap) = connect(&listener).await;
    let server = tokio::spawn(async move {
        let mut buf = Vec::new();
        let frame = read_frame(&mut sock, &mut buf).await;
        let msgid = frame_msgid(&frame);
        // no answer; the client gives up and abandons the operation
        let abandon = read_frame(&mut sock, &mut buf).await;
        assert_eq!(frame_op_id(&abandon), 16);
        assert_eq!(abandon_target(&abandon), msgid);
    });
    let res = ldap
        .with_timeout(Duration::from_millis(50))
        .extended(WhoAmI)
        .await;
    assert!(matches!(res, Err(LdapError::Timeout { .. })));
    server.await.unwrap();
}

#[tokio::test]
async fn connection_loss_fails_pending_operations() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut sock, mut ldap) = connect(&listener).await;
    let server = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _frame = read_frame(&mut sock, &mut buf).await;
        drop(sock);
    });
    let res = ldap.extended(WhoAmI).await;
    match res {
        Err(ref e @ LdapError::ConnectionClosed) => assert_eq!(e.result_code(), 91),
        other => panic!("expected connection loss, got {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn streaming_search_yields_entries_then_result() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut sock, mut ldap) = connect(&listener).await;
    let server = tokio::spawn(async move {
        let mut buf = Vec::new();
        let frame = read_frame(&mut sock, &mut buf).await;
        assert_eq!(frame_op_id(&frame), 3);
        let msgid = frame_msgid(&frame);
        for dn in ["uid=a,dc=example,dc=org", "uid=b,dc=example,dc=org"] {
            let reply = envelope(msgid, entry_op(dn));
            sock.write_all(&reply).await.unwrap();
        }
        let done = envelope(msgid, result_op(5, 0, vec![]));
        sock.write_all(&done).await.unwrap();
        sock
    });
    let mut stream = ldap
        .streaming_search("dc=example,dc=org", Scope::Subtree, "(uid=*)", vec!["uid"])
        .await
        .unwrap();
    let mut dns = Vec::new();
    while let Some(entry) = stream.next().await.unwrap() {
        dns.push(SearchEntry::construct(entry).dn);
    }
    assert_eq!(dns, ["uid=a,dc=example,dc=org", "uid=b,dc=example,dc=org"]);
    let res = stream.finish().await;
    assert_eq!(res.rc, 0);
    server.await.unwrap();
}

#[tokio::test]
async fn abandoned_search_reports_user_cancelled() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut sock, mut ldap) = connect(&listener).await;
    let server = tokio::spawn(async move {
        let mut buf = Vec::new();
        let frame = read_frame(&mut sock, &mut buf).await;
        let msgid = frame_msgid(&frame);
        let reply = envelope(msgid, entry_op("uid=a,dc=example,dc=org"));
        sock.write_all(&reply).await.unwrap();
        // no Done; the client walks away from the stream and abandons it
        let abandon = read_frame(&mut sock, &mut buf).await;
        assert_eq!(frame_op_id(&abandon), 16);
        assert_eq!(abandon_target(&abandon), msgid);
    });
    let mut stream = ldap
        .streaming_search("dc=example,dc=org", Scope::Subtree, "(uid=*)", vec!["uid"])
        .await
        .unwrap();
    let entry = stream.next().await.unwrap();
    assert!(entry.is_some());
    let res = stream.finish().await;
    assert_eq!(res.rc, 88);
    server.await.unwrap();
}

#[tokio::test]
async fn unbind_closes_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut sock, mut ldap) = connect(&listener).await;
    let server = tokio::spawn(async move {
        let mut buf = Vec::new();
        let frame = read_frame(&mut sock, &mut buf).await;
        assert_eq!(frame_op_id(&frame), 2);
        // Unbind has no response; the client just closes its side
        let mut tmp = [0u8; 16];
        assert_eq!(sock.read(&mut tmp).await.unwrap(), 0);
    });
    ldap.unbind().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn unknown_critical_control_fails_only_its_operation() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut sock, ldap) = connect(&listener).await;
    let server = tokio::spawn(async move {
        let mut buf = Vec::new();
        let first = read_frame(&mut sock, &mut buf).await;
        let second = read_frame(&mut sock, &mut buf).await;
        // poison the earlier operation's response with an unknown
        // critical control, answer the other one normally
        let poisoned = envelope_parts(
            frame_msgid(&first),
            result_op(24, 0, vec![]),
            Some(critical_control("1.2.3.4")),
        );
        sock.write_all(&poisoned).await.unwrap();
        let clean = envelope(frame_msgid(&second), result_op(24, 0, vec![]));
        sock.write_all(&clean).await.unwrap();
        sock
    });
    async fn whoami(mut ldap: Ldap) -> ldaptalk::result::Result<ldaptalk::result::ExopResult> {
        ldap.extended(WhoAmI).await
    }
    let (a, b) = tokio::join!(whoami(ldap.clone()), whoami(ldap.clone()));
    let (err, res) = match (a, b) {
        (Err(e), Ok(res)) | (Ok(res), Err(e)) => (e, res),
        other => panic!("expected one failure and one success, got {:?}", other),
    };
    assert!(matches!(err, LdapError::UnavailableCriticalExtension(ref oid) if oid == "1.2.3.4"));
    assert_eq!(err.result_code(), 12);
    assert_eq!(res.1.rc, 0);
    server.await.unwrap();
}
