//! End-to-end scenarios driven over real TCP connections: basic pub/sub,
//! ack, schema validation, timeout-driven redelivery, unsubscribe, and
//! tolerance of malformed frames.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use postal::Config;

async fn start_server() -> postal::Server {
    let config = Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        unacked_scan_interval: Duration::from_millis(50),
        unacked_timeout: Duration::from_millis(100),
        buf_size: 4096,
        consumer_queue_size: 1,
    };
    postal::serve(config).await.expect("server should bind")
}

async fn connect(addr: std::net::SocketAddr) -> (impl AsyncWriteExt + Unpin, BufReader<impl AsyncReadExt + Unpin>) {
    let stream = TcpStream::connect(addr).await.expect("connect should succeed");
    let (read_half, write_half) = stream.into_split();
    (write_half, BufReader::new(read_half))
}

async fn read_welcome<R: AsyncReadExt + Unpin>(reader: &mut BufReader<R>) {
    let mut line = String::new();
    tokio::io::AsyncBufReadExt::read_line(reader, &mut line).await.unwrap();
    assert_eq!(line, "MSG $WELCOME 0\r\n");
    let mut blank = String::new();
    tokio::io::AsyncBufReadExt::read_line(reader, &mut blank).await.unwrap();
    assert_eq!(blank, "\r\n");
}

struct MsgFrame {
    topic: String,
    id: String,
    payload: Vec<u8>,
}

async fn read_msg<R: AsyncReadExt + Unpin>(reader: &mut BufReader<R>) -> MsgFrame {
    let mut line = String::new();
    tokio::io::AsyncBufReadExt::read_line(reader, &mut line).await.unwrap();
    let line = line.trim_end_matches(['\r', '\n']);
    let tokens: Vec<&str> = line.split(' ').collect();
    assert_eq!(tokens[0], "MSG");
    let topic = tokens[1].to_owned();
    let id = tokens[2].to_owned();
    let len: usize = tokens[3].parse().unwrap();

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.unwrap();
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).await.unwrap();

    MsgFrame { topic, id, payload }
}

#[tokio::test]
async fn s1_publish_subscribe_basic() {
    let server = start_server().await;

    let (mut sub_w, mut sub_r) = connect(server.local_addr).await;
    read_welcome(&mut sub_r).await;
    sub_w.write_all(b"SUB test\r\n").await.unwrap();

    let (mut pub_w, mut pub_r) = connect(server.local_addr).await;
    read_welcome(&mut pub_r).await;
    pub_w.write_all(b"PUB test 4\r\ndata\r\n").await.unwrap();

    let msg = read_msg(&mut sub_r).await;
    assert_eq!(msg.topic, "test");
    assert_eq!(msg.payload, b"data");
    assert_eq!(msg.id.len(), 32);
    assert!(msg.id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    server.shutdown();
}

#[tokio::test]
async fn s2_ack_clears_unacked_before_timeout() {
    let server = start_server().await;

    let (mut sub_w, mut sub_r) = connect(server.local_addr).await;
    read_welcome(&mut sub_r).await;
    sub_w.write_all(b"SUB test\r\n").await.unwrap();

    let (mut pub_w, mut pub_r) = connect(server.local_addr).await;
    read_welcome(&mut pub_r).await;
    pub_w.write_all(b"PUB test 4\r\ndata\r\n").await.unwrap();

    let msg = read_msg(&mut sub_r).await;
    sub_w
        .write_all(format!("ACK {}\r\n", msg.id).as_bytes())
        .await
        .unwrap();

    // an acked message must not reappear even after the unacked timer fires
    let outcome = tokio::time::timeout(Duration::from_millis(400), read_msg(&mut sub_r)).await;
    assert!(outcome.is_err(), "acked message should not be redelivered");

    server.shutdown();
}

#[tokio::test]
async fn s5_timeout_redelivery() {
    let server = start_server().await;

    let (mut sub_w, mut sub_r) = connect(server.local_addr).await;
    read_welcome(&mut sub_r).await;
    sub_w.write_all(b"SUB test\r\n").await.unwrap();

    let (mut pub_w, mut pub_r) = connect(server.local_addr).await;
    read_welcome(&mut pub_r).await;
    pub_w.write_all(b"PUB test 4\r\ndata\r\n").await.unwrap();

    let first = read_msg(&mut sub_r).await;
    assert_eq!(first.payload, b"data");

    // no ack: the unacked timer should requeue and redeliver within the
    // configured scan interval + timeout
    let second = tokio::time::timeout(Duration::from_secs(2), read_msg(&mut sub_r))
        .await
        .expect("redelivery should happen before the test timeout");
    assert_eq!(second.id, first.id);
    assert_eq!(second.payload, b"data");

    server.shutdown();
}

#[tokio::test]
async fn s4_schema_rejects_then_accepts() {
    let server = start_server().await;

    let (mut sub_w, mut sub_r) = connect(server.local_addr).await;
    read_welcome(&mut sub_r).await;
    sub_w.write_all(b"SUB users\r\n").await.unwrap();

    let (mut pub_w, mut pub_r) = connect(server.local_addr).await;
    read_welcome(&mut pub_r).await;
    pub_w
        .write_all(b"SCHEMA users 13\r\n[ age > int ]")
        .await
        .unwrap();
    pub_w
        .write_all(br#"PUB users 14
{"age":"hi"}"#.replace('\n', "\r\n").as_bytes())
        .await
        .unwrap();
    pub_w
        .write_all(b"PUB users 11\r\n{\"age\":42}\r\n")
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(1), read_msg(&mut sub_r))
        .await
        .expect("the valid publish should be delivered");
    assert_eq!(msg.payload, br#"{"age":42}"#.to_vec());

    server.shutdown();
}

#[tokio::test]
async fn unsub_stops_further_delivery() {
    let server = start_server().await;

    let (mut sub_w, mut sub_r) = connect(server.local_addr).await;
    read_welcome(&mut sub_r).await;
    sub_w.write_all(b"SUB test\r\n").await.unwrap();
    sub_w.write_all(b"UNSUB test\r\n").await.unwrap();

    let (mut pub_w, mut pub_r) = connect(server.local_addr).await;
    read_welcome(&mut pub_r).await;
    pub_w.write_all(b"PUB test 4\r\ndata\r\n").await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(300), read_msg(&mut sub_r)).await;
    assert!(outcome.is_err(), "unsubscribed consumer should receive nothing");

    server.shutdown();
}

#[tokio::test]
async fn malformed_frame_does_not_close_connection() {
    let server = start_server().await;

    let (mut w, mut r) = connect(server.local_addr).await;
    read_welcome(&mut r).await;

    w.write_all(b"NOTACOMMAND\r\n").await.unwrap();
    w.write_all(b"SUB test\r\n").await.unwrap();

    let (mut pub_w, mut pub_r) = connect(server.local_addr).await;
    read_welcome(&mut pub_r).await;
    pub_w.write_all(b"PUB test 2\r\nhi\r\n").await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(1), read_msg(&mut r))
        .await
        .expect("connection should survive the malformed frame");
    assert_eq!(msg.payload, b"hi");

    server.shutdown();
}
