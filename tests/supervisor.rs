mod common;

use std::time::{Duration, Instant};

use health_node::supervisor::{
    CoreRunner, InboundProtocol, ReadinessPoller, ATTEMPT_TIMEOUT, LOG_TAIL_BYTES, POLL_INTERVAL,
};
use health_node::Error;
use tokio::net::TcpStream;

use common::{free_port, mock_core, outbound};

#[tokio::test]
async fn test_core_becomes_ready_and_stop_closes_port() {
    let port = free_port();
    let mut core = CoreRunner::new(mock_core(), port)
        .start(&outbound("vless"))
        .unwrap();
    assert!(core.config_path().exists());
    assert_eq!(core.endpoint(), format!("127.0.0.1:{}", port));

    let started = Instant::now();
    ReadinessPoller::default()
        .wait(core.endpoint(), Duration::from_secs(5))
        .await
        .unwrap();
    // mock-core binds right away, so at most one refused attempt plus one
    // retry interval passes before the port answers
    let elapsed = started.elapsed();
    assert!(elapsed < ATTEMPT_TIMEOUT + POLL_INTERVAL, "ready after {:?}", elapsed);

    core.stop().await;
    core.stop().await;
    assert!(!core.is_running());
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());

    // Log survives the stop for diagnostics
    let tail = core.read_log_tail(LOG_TAIL_BYTES);
    assert!(tail.contains("mock-core: args=-config "), "{}", tail);
    assert!(tail.contains("listening on"), "{}", tail);
}

#[tokio::test]
async fn test_wait_ready_reports_early_exit() {
    let mut core = CoreRunner::new(mock_core(), free_port())
        .start(&outbound("fail"))
        .unwrap();

    let err = core
        .wait_ready(&ReadinessPoller::default(), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CoreExited { .. }));
    assert!(core.read_log_tail(LOG_TAIL_BYTES).contains("outbound rejected"));
    core.stop().await;
}

#[tokio::test]
async fn test_missing_binary_is_launch_error() {
    let err = CoreRunner::new("/nonexistent/v2ray", free_port())
        .start(&outbound("vmess"))
        .unwrap_err();
    assert!(matches!(err, Error::Launch { .. }));
}

#[tokio::test]
async fn test_http_inbound_config() {
    let mut core = CoreRunner::new(mock_core(), free_port())
        .inbound(InboundProtocol::Http)
        .log_level("debug")
        .start(&outbound("trojan"))
        .unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(core.config_path()).unwrap()).unwrap();
    assert_eq!(written["inbounds"][0]["protocol"], "http");
    assert_eq!(written["log"]["loglevel"], "debug");
    assert_eq!(
        written["log"]["access"],
        core.access_log_path().display().to_string()
    );
    assert_eq!(written["outbounds"][1]["tag"], "direct");

    core.wait_ready(&ReadinessPoller::default(), Duration::from_secs(5))
        .await
        .unwrap();
    core.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_xray_named_binary_uses_run_style() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let xray = dir.path().join("xray");
    std::os::unix::fs::symlink(mock_core(), &xray).unwrap();

    let mut core = CoreRunner::new(&xray, free_port())
        .start(&outbound("vless"))
        .unwrap();
    core.wait_ready(&ReadinessPoller::default(), Duration::from_secs(5))
        .await
        .unwrap();

    let mode = std::fs::metadata(core.config_path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    core.stop().await;
    let tail = core.read_log_tail(LOG_TAIL_BYTES);
    assert!(tail.contains("mock-core: args=run -c "), "{}", tail);
}
