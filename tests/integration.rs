//! End-to-end scenarios driving the server over real TCP sockets,
//! covering the BEGIN/END/REPORT lifecycle, rectangle-invariance,
//! and response ordering under pipelining.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use tripstore::codec::{self, Frame};
use tripstore::server::Server;

/// Spawns a server bound to ephemeral ports and returns its addresses.
fn spawn_server() -> (SocketAddr, SocketAddr) {
    let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let mut server = Server::bind(loopback, loopback).expect("server should bind");
    let ingest_addr = server.ingest_addr().unwrap();
    let query_addr = server.query_addr().unwrap();

    thread::spawn(move || {
        let _ = server.run();
    });

    // Give the event-loop thread a moment to reach its first poll.
    thread::sleep(Duration::from_millis(50));
    (ingest_addr, query_addr)
}

fn send_begin(stream: &mut TcpStream, lng: f32, lat: f32) -> i32 {
    codec::write_all_retry(stream, &codec::encode_begin(lng, lat)).unwrap();
    let mut buf = [0u8; codec::HEADER_LEN + 4];
    codec::read_exact_retry(stream, &mut buf).unwrap();
    match codec::decode_frame(&buf).unwrap() {
        Frame::Id { id } => id,
        other => panic!("expected an ID reply, got {other:?}"),
    }
}

fn send_end(stream: &mut TcpStream, id: i32, lng: f32, lat: f32, cents: i32) {
    codec::write_all_retry(stream, &codec::encode_end(id, lng, lat, cents)).unwrap();
}

fn send_update(stream: &mut TcpStream, id: i32, lng: f32, lat: f32) {
    codec::write_all_retry(stream, &codec::encode_update(id, lng, lat)).unwrap();
}

fn query(query_addr: SocketAddr, lines: &[&str]) -> Vec<String> {
    let mut stream = TcpStream::connect(query_addr).unwrap();
    for line in lines {
        writeln!(stream, "{line}").unwrap();
    }
    let mut reader = BufReader::new(stream);
    let mut out = Vec::new();
    for _ in lines {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        out.push(line.trim_end_matches('\n').to_string());
    }
    out
}

#[test]
fn s1_begin_end_then_report2() {
    let (ingest_addr, query_addr) = spawn_server();
    let mut ingest = TcpStream::connect(ingest_addr).unwrap();

    let id = send_begin(&mut ingest, -122.27, 37.45);
    assert_eq!(id, 1);
    send_end(&mut ingest, id, -122.26, 37.46, 1200);
    thread::sleep(Duration::from_millis(50));

    let rows = query(
        query_addr,
        &["SELECT id, begin IS NOT NULL, end IS NOT NULL FROM tripsummary"],
    );
    assert_eq!(rows, vec!["1 1 1"]);

    let rows = query(query_addr, &["REPORT2 37.0 38.0 -123.0 -122.0"]);
    assert_eq!(rows, vec!["1 1200"]);
}

#[test]
fn s2_two_concurrent_clients_get_distinct_ids() {
    let (ingest_addr, _query_addr) = spawn_server();
    let mut a = TcpStream::connect(ingest_addr).unwrap();
    let mut b = TcpStream::connect(ingest_addr).unwrap();

    let id_a = send_begin(&mut a, -122.2, 37.4);
    let id_b = send_begin(&mut b, -122.21, 37.41);

    assert_ne!(id_a, id_b);
    assert_eq!(id_a + id_b, 3);
}

#[test]
fn s3_report1_invariant_under_inverted_rectangle() {
    let (ingest_addr, query_addr) = spawn_server();
    let mut ingest = TcpStream::connect(ingest_addr).unwrap();
    let id = send_begin(&mut ingest, -122.27, 37.45);
    send_end(&mut ingest, id, -122.26, 37.46, 1200);
    thread::sleep(Duration::from_millis(50));

    let normal = query(query_addr, &["REPORT1 37.4 37.5 -122.3 -122.2"]);
    let inverted = query(query_addr, &["REPORT1 37.5 37.4 -122.2 -122.3"]);
    assert_eq!(normal, inverted);
    assert_eq!(normal, vec!["1"]);
}

#[test]
fn s4_report3_far_future_after_trip_ends_is_zero() {
    let (ingest_addr, query_addr) = spawn_server();
    let mut ingest = TcpStream::connect(ingest_addr).unwrap();
    let id = send_begin(&mut ingest, -122.27, 37.45);
    send_end(&mut ingest, id, -122.26, 37.46, 1200);
    thread::sleep(Duration::from_millis(50));

    let rows = query(query_addr, &["REPORT3 '2099-01-01 00:00:00'"]);
    assert_eq!(rows, vec!["0"]);
}

#[test]
fn s5_generic_sql_arithmetic() {
    let (_ingest_addr, query_addr) = spawn_server();
    let rows = query(query_addr, &["SELECT 1+1"]);
    assert_eq!(rows, vec!["2"]);
}

#[test]
fn s6_generic_sql_error_surfaces() {
    let (_ingest_addr, query_addr) = spawn_server();
    let rows = query(query_addr, &["SELECT foo FROM bar"]);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("error: "));
}

#[test]
fn pipelined_queries_reply_in_request_order() {
    let (ingest_addr, query_addr) = spawn_server();
    let mut ingest = TcpStream::connect(ingest_addr).unwrap();
    send_begin(&mut ingest, -122.27, 37.45);

    let rows = query(query_addr, &["SELECT 1", "SELECT 2", "SELECT 3"]);
    assert_eq!(rows, vec!["1", "2", "3"]);
}

#[test]
fn transit_updates_do_not_touch_summary() {
    let (ingest_addr, query_addr) = spawn_server();
    let mut ingest = TcpStream::connect(ingest_addr).unwrap();
    let id = send_begin(&mut ingest, -122.27, 37.45);
    send_update(&mut ingest, id, -122.26, 37.44);
    send_update(&mut ingest, id, -122.25, 37.43);
    send_end(&mut ingest, id, -122.24, 37.42, 500);
    thread::sleep(Duration::from_millis(50));

    let rows = query(
        query_addr,
        &["SELECT COUNT(*) FROM triplog WHERE id = 1 AND type = 1"],
    );
    assert_eq!(rows, vec!["2"]);
}
