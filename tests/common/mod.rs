#![allow(dead_code)]

use std::path::PathBuf;

use health_node::supervisor::OutboundDescriptor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub fn mock_core() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mock-core"))
}

pub fn outbound(protocol: &str) -> OutboundDescriptor {
    OutboundDescriptor::from_json(&format!(
        r#"{{"tag":"proxy","protocol":"{}","settings":{{"vnext":[]}}}}"#,
        protocol
    ))
    .unwrap()
}

/// A port nothing listens on right now
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// HTTP origin answering every request with `status` and `body`
pub async fn spawn_origin(status: u16, body: Vec<u8>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = if status == 204 {
                    "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string()
                } else {
                    format!(
                        "HTTP/1.1 {} X\r\nConnection: close\r\nContent-Length: {}\r\n\r\n",
                        status,
                        body.len()
                    )
                };
                let _ = stream.write_all(head.as_bytes()).await;
                if status != 204 {
                    let _ = stream.write_all(&body).await;
                }
                let _ = stream.shutdown().await;
            });
        }
    });

    port
}
