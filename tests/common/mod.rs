#![allow(dead_code)]

use rustls::{
    RootCertStore, ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
};
use socks5_tls_forwarder::{
    SecureRequestForwarder,
    config::{ForwarderConfig, ProxyCredentials, TargetEndpoint, Timeouts},
    protocol::{Command, UserKey},
    tls::TlsPolicy,
};
use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_rustls::TlsAcceptor;

pub const TARGET_HOST: &str = "api.test.local";
pub const USER: &str = "lovable-proxy";
pub const PASSWORD: &str = "secret";

/// How the scripted SOCKS5 upstream treats each connection.
#[derive(Clone, Copy, Debug)]
pub enum ProxyMode {
    /// Authenticate, then relay every CONNECT to the destination.
    Relay(SocketAddr),
    /// Answer the credentials with a failure status.
    RejectAuth,
    /// Answer the CONNECT with this reply code.
    Reply(u8),
}

pub struct FakeProxy {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicUsize>,
    pub connect_targets: Arc<Mutex<Vec<String>>>,
}

impl FakeProxy {
    pub async fn start(mode: ProxyMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let connect_targets = Arc::new(Mutex::new(Vec::new()));

        let counter = connections.clone();
        let targets = connect_targets.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let targets = targets.clone();
                tokio::spawn(async move {
                    let _ = serve_socks5(socket, mode, targets).await;
                });
            }
        });

        Self {
            addr,
            connections,
            connect_targets,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn connect_targets(&self) -> Vec<String> {
        self.connect_targets.lock().unwrap().clone()
    }
}

async fn serve_socks5(mut socket: TcpStream, mode: ProxyMode, targets: Arc<Mutex<Vec<String>>>) -> std::io::Result<()> {
    assert_eq!(socket.read_u8().await?, 0x05);
    let n = socket.read_u8().await? as usize;
    let mut methods = vec![0; n];
    socket.read_exact(&mut methods).await?;
    assert_eq!(methods, vec![0x02], "only username/password may be offered");
    socket.write_all(&[0x05, 0x02]).await?;

    assert_eq!(socket.read_u8().await?, 0x01);
    let username = read_string(&mut socket).await?;
    let password = read_string(&mut socket).await?;
    if matches!(mode, ProxyMode::RejectAuth) || username != USER || password != PASSWORD {
        socket.write_all(&[0x01, 0x01]).await?;
        return Ok(());
    }
    socket.write_all(&[0x01, 0x00]).await?;

    assert_eq!(socket.read_u8().await?, 0x05);
    let command = Command::try_from(socket.read_u8().await?)?;
    assert_eq!(command, Command::Connect);
    assert_eq!(socket.read_u8().await?, 0x00);
    let host = match socket.read_u8().await? {
        0x03 => read_string(&mut socket).await?,
        0x01 => {
            let mut ip = [0; 4];
            socket.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        atyp => panic!("unexpected address type {atyp:#x}"),
    };
    let port = socket.read_u16().await?;
    targets.lock().unwrap().push(format!("{host}:{port}"));

    let destination = match mode {
        ProxyMode::Relay(destination) => destination,
        ProxyMode::Reply(code) => {
            socket.write_all(&[0x05, code, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
            return Ok(());
        }
        ProxyMode::RejectAuth => unreachable!(),
    };

    let mut upstream = TcpStream::connect(destination).await?;
    let bound = upstream.local_addr()?;
    let mut reply = vec![0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1];
    reply.extend_from_slice(&bound.port().to_be_bytes());
    socket.write_all(&reply).await?;

    tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
    Ok(())
}

async fn read_string<R: AsyncRead + Unpin>(r: &mut R) -> std::io::Result<String> {
    let len = r.read_u8().await? as usize;
    let mut buf = vec![0; len];
    r.read_exact(&mut buf).await?;
    Ok(String::from_utf8(buf).unwrap())
}

/// How the TLS destination treats each connection.
#[derive(Clone, Debug)]
pub enum DestinationMode {
    /// Answer with this status and a chunked body made of these pieces.
    Respond(u16, Vec<&'static str>),
    /// Answer like `Respond`, then reset the connection without close_notify.
    RespondThenReset(u16, Vec<&'static str>),
    /// Complete the TLS handshake, read the request, never answer.
    Silent,
    /// Accept TCP but never speak TLS.
    NoTls,
}

#[derive(Debug)]
pub enum Observed {
    /// Request head (and body, if any) as received.
    Request(String),
    /// Raw bytes seen on a connection that never spoke TLS.
    Raw(Vec<u8>),
    /// The client side closed or destroyed the connection.
    Closed,
}

pub struct Destination {
    pub addr: SocketAddr,
    pub accepted: Arc<AtomicUsize>,
    pub events: mpsc::UnboundedReceiver<Observed>,
    pub roots: Arc<RootCertStore>,
}

pub fn self_signed(host: &str) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    (cert.der().clone(), key)
}

pub fn roots_for(cert: CertificateDer<'static>) -> Arc<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.add(cert).unwrap();
    Arc::new(roots)
}

impl Destination {
    pub async fn start(mode: DestinationMode) -> Self {
        let (cert, key) = self_signed(TARGET_HOST);
        let roots = roots_for(cert.clone());
        let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert], key)
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let (tx, events) = mpsc::unbounded_channel();

        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let mode = mode.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    serve_destination(socket, acceptor, mode, tx).await;
                });
            }
        });

        Self {
            addr,
            accepted,
            events,
            roots,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub async fn next_event(&mut self) -> Observed {
        tokio::time::timeout(Duration::from_secs(10), self.events.recv())
            .await
            .expect("destination event")
            .expect("destination channel open")
    }
}

async fn serve_destination(mut socket: TcpStream, acceptor: TlsAcceptor, mode: DestinationMode, tx: mpsc::UnboundedSender<Observed>) {
    if let DestinationMode::NoTls = mode {
        let mut seen = Vec::new();
        let mut buf = [0; 4096];
        while let Ok(n) = socket.read(&mut buf).await {
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }
        let _ = tx.send(Observed::Raw(seen));
        let _ = tx.send(Observed::Closed);
        return;
    }

    let Ok(mut tls) = acceptor.accept(socket).await else {
        let _ = tx.send(Observed::Closed);
        return;
    };

    let request = read_request(&mut tls).await;
    let _ = tx.send(Observed::Request(request));

    let (answer, reset) = match mode {
        DestinationMode::Respond(status, chunks) => (Some((status, chunks)), false),
        DestinationMode::RespondThenReset(status, chunks) => (Some((status, chunks)), true),
        _ => (None, false),
    };
    if let Some((status, chunks)) = answer {
        let head = format!("HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n");
        if tls.write_all(head.as_bytes()).await.is_err() {
            let _ = tx.send(Observed::Closed);
            return;
        }
        for chunk in chunks {
            let framed = format!("{:x}\r\n{chunk}\r\n", chunk.len());
            if tls.write_all(framed.as_bytes()).await.is_err() || tls.flush().await.is_err() {
                let _ = tx.send(Observed::Closed);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = tls.write_all(b"0\r\n\r\n").await;
        let _ = tls.flush().await;
    }

    if reset {
        // Already queued bytes stay readable ahead of the RST.
        let (socket, _) = tls.into_inner();
        let _ = socket.set_linger(Some(Duration::ZERO));
        drop(socket);
        let _ = tx.send(Observed::Closed);
        return;
    }

    let mut buf = [0; 1024];
    while let Ok(n) = tls.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
    let _ = tx.send(Observed::Closed);
}

async fn read_request<R: AsyncRead + Unpin>(r: &mut R) -> String {
    let mut seen = Vec::new();
    let mut buf = [0; 1024];
    let head_end = loop {
        if let Some(pos) = seen.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match r.read(&mut buf).await {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&seen).into_owned(),
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    };

    let head = String::from_utf8_lossy(&seen[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while seen.len() < head_end + content_length {
        match r.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&seen).into_owned()
}

pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(5),
        handshake: Duration::from_millis(300),
        request: Duration::from_millis(500),
    }
}

pub fn forwarder_config(proxy: SocketAddr, tls: TlsPolicy, timeouts: Timeouts) -> ForwarderConfig {
    ForwarderConfig {
        proxy: ProxyCredentials::new("127.0.0.1", proxy.port(), UserKey::new(USER, PASSWORD)),
        target: TargetEndpoint::https(TARGET_HOST),
        timeouts,
        tls,
    }
}

pub fn forwarder(proxy: SocketAddr, roots: Arc<RootCertStore>, timeouts: Timeouts) -> SecureRequestForwarder {
    SecureRequestForwarder::new(&forwarder_config(proxy, TlsPolicy::CustomRoots(roots), timeouts)).unwrap()
}
