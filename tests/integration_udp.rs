//! Socket-level round trips against a live listener and a mock upstream
//! resolver, both on loopback.

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use dns_warden::cache::ResponseCache;
use dns_warden::config::Config;
use dns_warden::db::Database;
use dns_warden::filter::FilterEngine;
use dns_warden::logger::QueryLogger;
use dns_warden::server::{DnsServer, Pipeline};
use dns_warden::stats::StatsCollector;
use dns_warden::upstream::UpstreamPool;

/// Starts a canned upstream resolver answering every A query with
/// 198.51.100.42.
async fn spawn_mock_upstream() -> String {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            let Ok(query) = Message::from_vec(&buf[..len]) else {
                continue;
            };
            let mut response = Message::new();
            response
                .set_id(query.id())
                .set_message_type(MessageType::Response)
                .set_op_code(OpCode::Query)
                .set_recursion_available(true);
            response.add_queries(query.queries().to_vec());
            if let Some(question) = query.queries().first() {
                if question.query_type() == RecordType::A {
                    response.add_answer(Record::from_rdata(
                        question.name().clone(),
                        60,
                        RData::A(A("198.51.100.42".parse().unwrap())),
                    ));
                }
            }
            let _ = socket.send_to(&response.to_vec().unwrap(), peer).await;
        }
    });

    addr.to_string()
}

async fn spawn_server(
    config: Config,
    upstream_addr: String,
) -> (std::net::SocketAddr, Arc<FilterEngine>, watch::Sender<bool>) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config;
    config.blocklists.custom_path = dir
        .path()
        .join("custom*.yaml")
        .to_string_lossy()
        .into_owned();
    let db_path = dir.path().join("test.db");
    let db = Arc::new(Database::open(db_path.to_str().unwrap()).unwrap());
    let filter = Arc::new(FilterEngine::new(config.clone(), Arc::clone(&db)).unwrap());
    let cache = Arc::new(ResponseCache::new(1000, Duration::from_secs(300)));
    let upstreams = Arc::new(UpstreamPool::new(vec![upstream_addr]));
    let pipeline = Arc::new(Pipeline::new(
        config,
        Arc::clone(&filter),
        cache,
        upstreams,
        Arc::new(StatsCollector::new()),
        QueryLogger::new(vec![]),
        db,
    ));

    let server = DnsServer::bind("127.0.0.1", 0, pipeline).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        // The tempdir must outlive the server
        let _dir = dir;
        server.serve(shutdown_rx).await.unwrap();
    });

    (addr, filter, shutdown_tx)
}

fn make_query_bytes(name: &str, qtype: RecordType, id: u16) -> Vec<u8> {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(Name::from_ascii(name).unwrap(), qtype));
    message.to_vec().unwrap()
}

async fn exchange(server: std::net::SocketAddr, packet: &[u8]) -> Message {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(server).await.unwrap();
    client.send(packet).await.unwrap();

    let mut buf = [0u8; 4096];
    let len = tokio::time::timeout(Duration::from_secs(5), client.recv(&mut buf))
        .await
        .expect("no reply within timeout")
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}

#[tokio::test]
async fn test_forward_and_block_over_udp() {
    let upstream = spawn_mock_upstream().await;
    let (addr, filter, _shutdown) = spawn_server(Config::default(), upstream).await;
    filter.add_custom("ads.example");

    // Allowed name is forwarded and answered
    let reply = exchange(addr, &make_query_bytes("www.rust-lang.org.", RecordType::A, 0xaaaa)).await;
    assert_eq!(reply.id(), 0xaaaa);
    assert_eq!(reply.response_code(), ResponseCode::NoError);
    assert_eq!(reply.answers().len(), 1);

    // Blocked name gets NXDOMAIN without touching the upstream
    let reply = exchange(addr, &make_query_bytes("ads.example.", RecordType::A, 0xbbbb)).await;
    assert_eq!(reply.id(), 0xbbbb);
    assert_eq!(reply.response_code(), ResponseCode::NXDomain);
    assert!(reply.answers().is_empty());
}

#[tokio::test]
async fn test_zero_question_message_gets_empty_reply() {
    let upstream = spawn_mock_upstream().await;
    let (addr, _filter, _shutdown) = spawn_server(Config::default(), upstream).await;

    let mut message = Message::new();
    message
        .set_id(0x0707)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query);
    let reply = exchange(addr, &message.to_vec().unwrap()).await;

    assert_eq!(reply.id(), 0x0707);
    assert_eq!(reply.response_code(), ResponseCode::NoError);
    assert!(reply.answers().is_empty());
    assert!(reply.queries().is_empty());
}

#[tokio::test]
async fn test_malformed_datagram_gets_header_only_reply() {
    let upstream = spawn_mock_upstream().await;
    let (addr, _filter, _shutdown) = spawn_server(Config::default(), upstream).await;

    // A full header followed by garbage that cannot decode as a question
    let mut packet = vec![0u8; 16];
    packet[0] = 0x12;
    packet[1] = 0x34;
    packet[4] = 0x00;
    packet[5] = 0x01; // claims one question, provides none
    packet[12] = 0xff;

    let reply = exchange(addr, &packet).await;
    assert_eq!(reply.id(), 0x1234);
    assert!(reply.queries().is_empty());
    assert!(reply.answers().is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let upstream = spawn_mock_upstream().await;
    let (addr, _filter, shutdown) = spawn_server(Config::default(), upstream).await;

    // Server answers before shutdown
    let reply = exchange(addr, &make_query_bytes("example.com.", RecordType::A, 1)).await;
    assert_eq!(reply.response_code(), ResponseCode::NoError);

    shutdown.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // After shutdown no reply arrives
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(addr).await.unwrap();
    client
        .send(&make_query_bytes("example.com.", RecordType::A, 2))
        .await
        .unwrap();
    let mut buf = [0u8; 512];
    let result = tokio::time::timeout(Duration::from_millis(500), client.recv(&mut buf)).await;
    assert!(result.is_err(), "listener still answering after shutdown");
}
