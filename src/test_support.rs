use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use crate::services::progress_sink::{EventReceiver, InstallEvent};

pub fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sketchy-{}-{}", label, Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp directory");
    dir
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o755);
    for (name, data) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Incompressible filler so archives keep their size after deflate.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

#[derive(Clone)]
pub enum Route {
    Body {
        body: Vec<u8>,
        send_length: bool,
        head_delay: Duration,
        chunk_delay: Duration,
    },
    Status(u16),
    Hang,
}

impl Route {
    pub fn archive(body: Vec<u8>) -> Self {
        Route::Body {
            body,
            send_length: true,
            head_delay: Duration::ZERO,
            chunk_delay: Duration::from_millis(2),
        }
    }

    pub fn without_length(body: Vec<u8>) -> Self {
        Route::Body {
            body,
            send_length: false,
            head_delay: Duration::ZERO,
            chunk_delay: Duration::from_millis(2),
        }
    }

    pub fn slow(body: Vec<u8>, chunk_delay: Duration) -> Self {
        Route::Body {
            body,
            send_length: true,
            head_delay: Duration::ZERO,
            chunk_delay,
        }
    }

    pub fn delayed(body: Vec<u8>, head_delay: Duration) -> Self {
        Route::Body {
            body,
            send_length: true,
            head_delay,
            chunk_delay: Duration::from_millis(2),
        }
    }
}

/// Minimal HTTP/1.1 server answering canned responses per path.
pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect(),
        );
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("test server address");
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let server_hits = hits.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let routes = routes.clone();
                let hits = server_hits.clone();
                tokio::spawn(async move {
                    serve(socket, routes, hits).await;
                });
            }
        });
        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .expect("hits lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: Arc<HashMap<String, Route>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let read = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(read) => read,
        };
        request.extend_from_slice(&buf[..read]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
    }
    let head = String::from_utf8_lossy(&request).to_string();
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    *hits.lock().expect("hits lock").entry(path.clone()).or_insert(0) += 1;

    match routes.get(&path).cloned() {
        Some(Route::Body {
            body,
            send_length,
            head_delay,
            chunk_delay,
        }) => {
            tokio::time::sleep(head_delay).await;
            let header = if send_length {
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
            } else {
                "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nConnection: close\r\n\r\n"
                    .to_string()
            };
            if socket.write_all(header.as_bytes()).await.is_err() {
                return;
            }
            for piece in body.chunks(100) {
                if socket.write_all(piece).await.is_err() || socket.flush().await.is_err() {
                    return;
                }
                tokio::time::sleep(chunk_delay).await;
            }
        }
        Some(Route::Status(code)) => {
            let response = format!(
                "HTTP/1.1 {} Canned\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
        Some(Route::Hang) => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        None => {
            let _ = socket
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        }
    }
    let _ = socket.shutdown().await;
}

/// Drains events until `expected` jobs have finished.
pub async fn collect_until_finished(
    events: &mut EventReceiver,
    expected: usize,
) -> Vec<InstallEvent> {
    let mut seen = Vec::new();
    let mut finished = 0;
    while finished < expected {
        let event = tokio::time::timeout(Duration::from_secs(20), events.recv())
            .await
            .expect("timed out waiting for install events")
            .expect("event channel closed");
        if matches!(event, InstallEvent::Finished { .. }) {
            finished += 1;
        }
        seen.push(event);
    }
    seen
}

pub fn progress_values(events: &[InstallEvent], item_id: &str) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            InstallEvent::Progress {
                item_id: id,
                fraction,
            } if id == item_id => Some(*fraction),
            _ => None,
        })
        .collect()
}

pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
