// ============================================
// File: crates/streamvpn-server/tests/tunnel_e2e.rs
// ============================================
//! End-to-end tests: a real server on loopback with TCP clients.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use streamvpn_common::Subnet;
use streamvpn_core::protocol::{challenge_response, Codec, ProtocolCodec, TunnelHeader, MAX_FRAME_SIZE};
use streamvpn_server::{Server, ServerConfig};
use streamvpn_transport::{framed_split, FramedReader, FramedWriter};

type Reader = FramedReader<tokio::io::ReadHalf<TcpStream>>;
type Writer = FramedWriter<tokio::io::WriteHalf<TcpStream>>;

const STEP_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    server: Arc<Server>,
    addr: SocketAddr,
    task: JoinHandle<streamvpn_server::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let mut config = ServerConfig::default();
        config.network.listen_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        config.vpn.virtual_ip_range = Subnet::clamped(Ipv4Addr::new(10, 0, 0, 0), 24);
        config.vpn.gateway_ip = Ipv4Addr::new(10, 0, 0, 1);

        let server = Arc::new(Server::new(config));
        let listener = server.bind().unwrap();
        let addr = listener.local_addr().unwrap();

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };

        Self { server, addr, task }
    }

    async fn stop(self) {
        self.server.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}

struct TestClient {
    reader: Reader,
    writer: Writer,
}

impl TestClient {
    async fn connect(addr: SocketAddr, identity: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = framed_split(stream, MAX_FRAME_SIZE);

        writer.send(identity.as_bytes()).await.unwrap();
        let challenge = recv(&mut reader).await.unwrap();
        assert_eq!(challenge.as_ref(), identity.as_bytes());
        writer
            .send(challenge_response(&challenge).as_bytes())
            .await
            .unwrap();

        Self { reader, writer }
    }

    async fn send_header(&mut self, header: &TunnelHeader) {
        self.writer
            .send(&ProtocolCodec::encode_header(header))
            .await
            .unwrap();
    }

    async fn read_header(&mut self) -> TunnelHeader {
        let mut frame = recv(&mut self.reader).await.unwrap();
        ProtocolCodec.decode(&mut frame).unwrap()
    }

    async fn request_dynamic(&mut self) -> Ipv4Addr {
        self.send_header(&TunnelHeader::address_request()).await;
        self.read_header().await.destination_addr()
    }
}

/// Reads one unit; `None` on EOF or connection error.
async fn recv(reader: &mut Reader) -> Option<Bytes> {
    tokio::time::timeout(STEP_TIMEOUT, reader.next_frame())
        .await
        .expect("timed out waiting for a unit")
        .ok()
        .flatten()
}

fn data_unit(source: Ipv4Addr, destination: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let mut header = TunnelHeader::address_request();
    header.total_length = u16::try_from(20 + payload.len()).unwrap();
    header.protocol = 6;
    header.source = source.octets();
    header.destination = destination.octets();

    let mut unit = ProtocolCodec::encode_header(&header).to_vec();
    unit.extend_from_slice(payload);
    unit
}

#[tokio::test]
async fn test_two_clients_exchange_data() {
    let server = TestServer::start().await;

    let mut a = TestClient::connect(server.addr, "client-a").await;
    let addr_a = a.request_dynamic().await;
    let mut b = TestClient::connect(server.addr, "client-b").await;
    let addr_b = b.request_dynamic().await;

    assert_eq!(addr_a, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(addr_b, Ipv4Addr::new(10, 0, 0, 3));

    // Unknown destination: dropped, A's session stays up
    a.writer
        .send(&data_unit(addr_a, Ipv4Addr::new(10, 0, 0, 200), b"nobody"))
        .await
        .unwrap();

    let unit = data_unit(addr_a, addr_b, b"ping from a");
    a.writer.send(&unit).await.unwrap();
    assert_eq!(recv(&mut b.reader).await.unwrap(), Bytes::from(unit));

    let reply = data_unit(addr_b, addr_a, b"pong from b");
    b.writer.send(&reply).await.unwrap();
    assert_eq!(recv(&mut a.reader).await.unwrap(), Bytes::from(reply));

    server.stop().await;
}

#[tokio::test]
async fn test_keepalive_echo() {
    let server = TestServer::start().await;

    let mut client = TestClient::connect(server.addr, "keepalive").await;
    client.request_dynamic().await;

    let keepalive = ProtocolCodec::encode_header(&TunnelHeader::keepalive());
    client.writer.send(&keepalive).await.unwrap();
    assert_eq!(recv(&mut client.reader).await.unwrap(), keepalive);

    server.stop().await;
}

#[tokio::test]
async fn test_static_request_and_conflict() {
    let server = TestServer::start().await;
    let wanted = Ipv4Addr::new(10, 0, 0, 42);

    let mut first = TestClient::connect(server.addr, "first").await;
    first.send_header(&TunnelHeader::static_request(wanted)).await;
    let reply = first.read_header().await;
    assert_eq!(reply.destination_addr(), wanted);
    assert_eq!(reply.source_addr(), Ipv4Addr::UNSPECIFIED);

    // Same address again: no reply, connection closed
    let mut second = TestClient::connect(server.addr, "second").await;
    second.send_header(&TunnelHeader::static_request(wanted)).await;
    assert!(recv(&mut second.reader).await.is_none());

    // The first session is unaffected
    let keepalive = ProtocolCodec::encode_header(&TunnelHeader::keepalive());
    first.writer.send(&keepalive).await.unwrap();
    assert_eq!(recv(&mut first.reader).await.unwrap(), keepalive);

    server.stop().await;
}

#[tokio::test]
async fn test_address_reused_after_disconnect() {
    let server = TestServer::start().await;

    let mut a = TestClient::connect(server.addr, "a").await;
    assert_eq!(a.request_dynamic().await, Ipv4Addr::new(10, 0, 0, 2));
    let mut b = TestClient::connect(server.addr, "b").await;
    assert_eq!(b.request_dynamic().await, Ipv4Addr::new(10, 0, 0, 3));

    drop(a);

    // Teardown is asynchronous; retry until the freed address comes back
    let mut reused = None;
    for attempt in 0..20 {
        let mut c = TestClient::connect(server.addr, &format!("c{attempt}")).await;
        let leased = c.request_dynamic().await;
        if leased == Ipv4Addr::new(10, 0, 0, 2) {
            reused = Some(leased);
            break;
        }
        drop(c);
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(reused, Some(Ipv4Addr::new(10, 0, 0, 2)));

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let server = TestServer::start().await;

    let mut client = TestClient::connect(server.addr, "bye").await;
    client.request_dynamic().await;

    server.stop().await;
    assert!(recv(&mut client.reader).await.is_none());
}
