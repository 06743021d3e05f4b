//! Stand-in for an xray/v2ray core in integration tests
//!
//! Reads the generated config, listens on the first inbound's port and, for
//! a socks inbound, serves no-auth SOCKS5 CONNECT. Each tunnel is written to
//! the access log. An outbound with protocol "fail" makes it exit at once.

use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::process::ExitCode;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    println!("mock-core: args={}", args.join(" "));

    let Some(config_path) = config_arg(&args) else {
        eprintln!("mock-core: usage: mock-core -config <file> | mock-core run -c <file>");
        return ExitCode::from(2);
    };

    let config: Value = match std::fs::read_to_string(&config_path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mock-core: cannot load {}: {}", config_path, e);
            return ExitCode::from(2);
        }
    };

    if config["outbounds"][0]["protocol"] == "fail" {
        eprintln!("mock-core: outbound rejected");
        return ExitCode::FAILURE;
    }

    let port = config["inbounds"][0]["port"].as_u64().unwrap_or(0);
    let socks = config["inbounds"][0]["protocol"] == "socks";
    let access_log = config["log"]["access"].as_str().map(PathBuf::from);

    let listener = match TcpListener::bind(("127.0.0.1", port as u16)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("mock-core: bind 127.0.0.1:{}: {}", port, e);
            return ExitCode::FAILURE;
        }
    };
    println!("mock-core: listening on 127.0.0.1:{}", port);

    loop {
        let Ok((stream, _)) = listener.accept().await else {
            continue;
        };
        let access_log = access_log.clone();
        tokio::spawn(async move {
            if socks {
                let _ = serve_socks(stream, access_log).await;
            } else {
                let mut stream = stream;
                let mut sink = Vec::new();
                let _ = stream.read_to_end(&mut sink).await;
            }
        });
    }
}

fn config_arg(args: &[String]) -> Option<String> {
    match args {
        [flag, path] if flag == "-config" => Some(path.clone()),
        [run, flag, path] if run == "run" && flag == "-c" => Some(path.clone()),
        _ => None,
    }
}

async fn serve_socks(mut client: TcpStream, access_log: Option<PathBuf>) -> std::io::Result<()> {
    let mut greeting = [0u8; 2];
    client.read_exact(&mut greeting).await?;
    let mut methods = vec![0u8; greeting[1] as usize];
    client.read_exact(&mut methods).await?;
    client.write_all(&[0x05, 0x00]).await?;

    let mut head = [0u8; 4];
    client.read_exact(&mut head).await?;
    let host = match head[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip).await?;
            Ipv4Addr::from(ip).to_string()
        }
        0x04 => {
            let mut ip = [0u8; 16];
            client.read_exact(&mut ip).await?;
            Ipv6Addr::from(ip).to_string()
        }
        _ => {
            let mut len = [0u8; 1];
            client.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            client.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
    };
    let mut port = [0u8; 2];
    client.read_exact(&mut port).await?;
    let port = u16::from_be_bytes(port);

    if let Some(path) = access_log {
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "accepted tcp:{}:{} [proxy]", host, port);
        }
    }

    let mut upstream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(upstream) => upstream,
        Err(e) => {
            client
                .write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await?;
            return Err(e);
        }
    };
    client
        .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0])
        .await?;

    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}
