//! Small TCP servers for transport-level scenarios httpmock cannot express.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read one HTTP/1.1 request (head plus `Content-Length` body) and return the head.
pub async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut have = buf.len() - head_end;
    while have < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        have += n;
    }
    Ok(head)
}

/// How a [`RawServer`] treats an accepted connection
#[derive(Clone)]
pub enum Behavior {
    /// Read the request, then close without answering
    CloseAfterRequest,
    /// Read the request and never answer
    Hang,
    /// Read the request and write these bytes verbatim, then close
    Respond(Vec<u8>),
    /// Read the request, write these bytes and stall with the connection open
    RespondThenStall(Vec<u8>),
}

/// HTTP/1.1 server whose connections follow a script.
///
/// Connection `n` (0-based) uses `script[n]`, the last entry repeating.
pub struct RawServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
}

impl RawServer {
    pub async fn start(script: Vec<Behavior>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let heads = Arc::new(Mutex::new(Vec::new()));

        let counter = connections.clone();
        let seen = heads.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let behavior = script[n.min(script.len() - 1)].clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let Ok(head) = read_request(&mut stream).await else {
                        return;
                    };
                    seen.lock().unwrap().push(head);
                    match behavior {
                        Behavior::CloseAfterRequest => {
                            let _ = stream.shutdown().await;
                        }
                        Behavior::Hang => {
                            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                        }
                        Behavior::Respond(bytes) => {
                            let _ = stream.write_all(&bytes).await;
                            let _ = stream.shutdown().await;
                        }
                        Behavior::RespondThenStall(bytes) => {
                            let _ = stream.write_all(&bytes).await;
                            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            connections,
            heads,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn request_heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

/// `HTTP/1.1 200` with a body and `Connection: close`
pub fn ok_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

/// Counters shared by the proxy servers below
#[derive(Default)]
pub struct ProxyStats {
    pub tunnels: AtomicUsize,
    pub targets: Mutex<Vec<String>>,
    pub auth: Mutex<Vec<Option<String>>>,
}

impl ProxyStats {
    pub fn tunnels(&self) -> usize {
        self.tunnels.load(Ordering::SeqCst)
    }
}

/// HTTP CONNECT proxy that tunnels every connection to `backend`,
/// whatever target the client asked for.
pub async fn spawn_connect_proxy(backend: SocketAddr) -> (SocketAddr, Arc<ProxyStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(ProxyStats::default());

    let shared = stats.clone();
    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let stats = shared.clone();
            tokio::spawn(async move {
                let Ok(head) = read_request(&mut client).await else {
                    return;
                };
                let mut lines = head.lines();
                let target = lines
                    .next()
                    .and_then(|l| l.strip_prefix("CONNECT "))
                    .and_then(|l| l.split_whitespace().next())
                    .map(str::to_owned);
                let Some(target) = target else {
                    let _ = client.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n").await;
                    return;
                };
                let auth = lines
                    .filter_map(|l| l.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("proxy-authorization"))
                    .map(|(_, value)| value.trim().to_owned());

                stats.tunnels.fetch_add(1, Ordering::SeqCst);
                stats.targets.lock().unwrap().push(target);
                stats.auth.lock().unwrap().push(auth);

                let Ok(mut upstream) = TcpStream::connect(backend).await else {
                    let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
                    return;
                };
                if client
                    .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                    .await
                    .is_err()
                {
                    return;
                }
                let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
            });
        }
    });

    (addr, stats)
}

/// SOCKS5 proxy forwarding every connection to `backend`.
///
/// With `credentials` set, username/password authentication is required.
pub async fn spawn_socks5_proxy(
    backend: SocketAddr,
    credentials: Option<(&'static str, &'static str)>,
) -> (SocketAddr, Arc<ProxyStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(ProxyStats::default());

    let shared = stats.clone();
    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let stats = shared.clone();
            tokio::spawn(async move {
                if socks5_handshake(&mut client, credentials, &stats).await.is_err() {
                    return;
                }
                let Ok(mut upstream) = TcpStream::connect(backend).await else {
                    return;
                };
                // succeeded, bound to 0.0.0.0:0
                if client
                    .write_all(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0])
                    .await
                    .is_err()
                {
                    return;
                }
                stats.tunnels.fetch_add(1, Ordering::SeqCst);
                let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
            });
        }
    });

    (addr, stats)
}

async fn socks5_handshake(
    client: &mut TcpStream,
    credentials: Option<(&str, &str)>,
    stats: &ProxyStats,
) -> std::io::Result<()> {
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await?;
    let mut methods = vec![0u8; usize::from(header[1])];
    client.read_exact(&mut methods).await?;

    match credentials {
        None => client.write_all(&[5, 0]).await?,
        Some((user, pass)) => {
            if !methods.contains(&2) {
                client.write_all(&[5, 0xff]).await?;
                return Err(std::io::ErrorKind::PermissionDenied.into());
            }
            client.write_all(&[5, 2]).await?;

            let mut ver_len = [0u8; 2];
            client.read_exact(&mut ver_len).await?;
            let mut got_user = vec![0u8; usize::from(ver_len[1])];
            client.read_exact(&mut got_user).await?;
            let mut plen = [0u8; 1];
            client.read_exact(&mut plen).await?;
            let mut got_pass = vec![0u8; usize::from(plen[0])];
            client.read_exact(&mut got_pass).await?;

            let ok = got_user == user.as_bytes() && got_pass == pass.as_bytes();
            stats.auth.lock().unwrap().push(Some(format!(
                "{}:{}",
                String::from_utf8_lossy(&got_user),
                String::from_utf8_lossy(&got_pass)
            )));
            client.write_all(&[1, u8::from(!ok)]).await?;
            if !ok {
                return Err(std::io::ErrorKind::PermissionDenied.into());
            }
        }
    }

    let mut request = [0u8; 4];
    client.read_exact(&mut request).await?;
    let target = match request[3] {
        1 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        3 => {
            let mut len = [0u8; 1];
            client.read_exact(&mut len).await?;
            let mut name = vec![0u8; usize::from(len[0])];
            client.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
        4 => {
            let mut ip = [0u8; 16];
            client.read_exact(&mut ip).await?;
            std::net::Ipv6Addr::from(ip).to_string()
        }
        _ => return Err(std::io::ErrorKind::InvalidData.into()),
    };
    let mut port = [0u8; 2];
    client.read_exact(&mut port).await?;
    stats
        .targets
        .lock()
        .unwrap()
        .push(format!("{target}:{}", u16::from_be_bytes(port)));
    Ok(())
}

/// SOCKS4 proxy forwarding every connection to `backend`.
pub async fn spawn_socks4_proxy(backend: SocketAddr) -> (SocketAddr, Arc<ProxyStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(ProxyStats::default());

    let shared = stats.clone();
    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let stats = shared.clone();
            tokio::spawn(async move {
                // VN, CD, DSTPORT, DSTIP, then a NUL-terminated USERID
                let mut request = [0u8; 8];
                if client.read_exact(&mut request).await.is_err() {
                    return;
                }
                let mut byte = [0u8; 1];
                loop {
                    if client.read_exact(&mut byte).await.is_err() {
                        return;
                    }
                    if byte[0] == 0 {
                        break;
                    }
                }
                let port = u16::from_be_bytes([request[2], request[3]]);
                let ip = std::net::Ipv4Addr::new(request[4], request[5], request[6], request[7]);
                stats.targets.lock().unwrap().push(format!("{ip}:{port}"));

                let Ok(mut upstream) = TcpStream::connect(backend).await else {
                    let _ = client.write_all(&[0, 0x5b, 0, 0, 0, 0, 0, 0]).await;
                    return;
                };
                if client
                    .write_all(&[0, 0x5a, 0, 0, 0, 0, 0, 0])
                    .await
                    .is_err()
                {
                    return;
                }
                stats.tunnels.fetch_add(1, Ordering::SeqCst);
                let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
            });
        }
    });

    (addr, stats)
}
