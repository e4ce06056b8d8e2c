//! Client sessions against a live relay on loopback.

use std::{
    io::{self, BufReader, Read, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream},
    sync::mpsc,
    thread,
    time::Duration,
};

use chorus_client::{ClientError, Session, connect};
use chorus_server::{EventLoop, RelayConfig, ShutdownHandle};

const WELCOME: &str = "hello from the relay\n";

fn start_relay() -> (SocketAddr, ShutdownHandle, thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let thread = thread::spawn(move || {
        let config = RelayConfig {
            bind_address: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            port: 0,
            welcome: Some(WELCOME.to_string()),
            ..Default::default()
        };
        let relay = EventLoop::bind(config).unwrap();
        tx.send((relay.local_addr().unwrap(), relay.shutdown_handle())).unwrap();
        relay.run().unwrap();
    });
    let (addr, handle) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    (addr, handle, thread)
}

/// Input that blocks until the test feeds it, like a quiet terminal.
struct FedInput(mpsc::Receiver<Vec<u8>>, Vec<u8>);

impl Read for FedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.1.is_empty() {
            match self.0.recv() {
                Ok(bytes) => self.1 = bytes,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.1.len());
        buf[..n].copy_from_slice(&self.1[..n]);
        self.1.drain(..n);
        Ok(n)
    }
}

fn listener_peer(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut welcome = vec![0; WELCOME.len()];
    stream.read_exact(&mut welcome).unwrap();
    stream
}

#[test]
fn named_lines_reach_other_peers() {
    let (addr, shutdown, relay) = start_relay();
    let mut listener = listener_peer(addr);

    let stream = connect("127.0.0.1", addr.port()).unwrap();
    let session = Session::new(stream, Some("ann".to_string()));
    let input = BufReader::new(io::Cursor::new(b"hello\nexit\nnever sent\n".to_vec()));
    session.run(input, io::sink()).unwrap();

    let mut got = vec![0; "ann: hello\n".len()];
    listener.read_exact(&mut got).unwrap();
    assert_eq!(got, b"ann: hello\n");

    shutdown.shutdown().unwrap();
    relay.join().unwrap();
}

#[test]
fn relay_hang_up_ends_session_with_input_still_open() {
    let (addr, shutdown, relay) = start_relay();
    let mut talker = listener_peer(addr);

    let (feed, fed) = mpsc::channel();
    let stream = connect("127.0.0.1", addr.port()).unwrap();
    let (done_tx, done_rx) = mpsc::channel();
    let client = thread::spawn(move || {
        let mut output = Vec::new();
        let result = Session::new(stream, None)
            .run(BufReader::new(FedInput(fed, Vec::new())), &mut output);
        done_tx.send(()).unwrap();
        (result, output)
    });

    // The client has joined once its welcome went out; wait for it, then talk.
    thread::sleep(Duration::from_millis(200));
    talker.write_all(b"are you there?\n").unwrap();
    thread::sleep(Duration::from_millis(200));

    shutdown.shutdown().unwrap();
    relay.join().unwrap();

    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let (result, output) = client.join().unwrap();
    result.unwrap();
    assert_eq!(output, format!("{WELCOME}are you there?\n").as_bytes());
    drop(feed);
}

#[test]
fn connect_to_closed_port_fails() {
    let port = {
        let probe = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        probe.local_addr().unwrap().port()
    };

    let err = connect("127.0.0.1", port).unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
}
