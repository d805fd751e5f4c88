use std::io::{BufReader, Cursor, Read};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use awlr_core::{UPTIME_STEP_SECS, topic};
use awlr_sim::{
    BackendClient, BackendConfig, Config, LoopExit, MockTransport, PublishError, PublishedMessage,
    Simulator, run_command_loop, run_listener, spawn_line_reader,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type TestSim = Simulator<MockTransport, StdRng>;
type TestResult = Result<(), Box<dyn std::error::Error>>;

fn test_config() -> Config {
    let mut config = Config::default();
    config.broker.ack_poll_interval_ms = 10;
    config.broker.ack_max_polls = 5;
    config.simulator.send_all_delay_ms = 0;
    config.simulator.reconnect_pause_ms = 0;
    config
}

fn simulator(mock: &MockTransport) -> Result<TestSim, Box<dyn std::error::Error>> {
    Ok(Simulator::from_config(
        &test_config(),
        mock.clone(),
        StdRng::seed_from_u64(42),
    )?)
}

async fn connected(mock: &MockTransport) -> Result<TestSim, Box<dyn std::error::Error>> {
    let mut sim = simulator(mock)?;
    sim.connect().await?;
    Ok(sim)
}

fn json(message: &PublishedMessage) -> serde_json::Value {
    serde_json::from_slice(&message.payload).unwrap()
}

fn lines(input: &'static str) -> mpsc::Receiver<String> {
    spawn_line_reader(Cursor::new(input.as_bytes())).unwrap()
}

/// A terminal nobody types into: every read blocks forever.
struct Silent;

impl Read for Silent {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            std::thread::park();
        }
    }
}

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn publish_sends_data_and_retained_status() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;
    let id = sim.registry().get(0)?.id.clone();

    let report = sim.publish(0).await?;
    assert!(report.is_complete());

    let published = mock.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].topic, topic::data_topic(&id));
    assert!(!published[0].retain);
    assert_eq!(published[1].topic, topic::status_topic(&id));
    assert!(published[1].retain);

    let data = json(&published[0]);
    let status = json(&published[1]);
    assert_eq!(data["timestamp"], status["timestamp"]);
    assert_eq!(status["status"], "online");
    assert_eq!(status["ota_update"], "idle");
    assert_eq!(status["uptime"], 3660 + UPTIME_STEP_SECS);

    Ok(())
}

#[tokio::test]
async fn normal_scenario_values_stay_in_range() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;

    for _ in 0..20 {
        let report = sim.publish(0).await?;
        let telemetry = &report.payloads.telemetry;
        assert_eq!(telemetry.rainfall, 0.0);
        assert!((5.0..=19.0).contains(&telemetry.water_level));
        assert!((80..=100).contains(&report.payloads.status.battery));
        assert!((-120..=-70).contains(&report.payloads.status.wifi_rssi));
    }

    Ok(())
}

#[tokio::test]
async fn uptime_advances_even_when_publishes_fail() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;
    let id = sim.registry().get(1)?.id.clone();
    let initial = sim.registry().get(1)?.uptime;
    mock.fail_topic(topic::data_topic(&id));

    for _ in 0..3 {
        let report = sim.publish(1).await?;
        assert!(!report.data.is_sent());
        assert!(report.status.is_sent());
        assert!(report.render(false).contains("[ERROR] Failed to publish to"));
    }

    assert_eq!(sim.registry().get(1)?.uptime, initial + 3 * UPTIME_STEP_SECS);
    // The sibling status publish still went out each time.
    assert_eq!(mock.published().len(), 3);
    assert!(mock.published().iter().all(|m| m.retain));

    Ok(())
}

#[tokio::test]
async fn publish_while_disconnected_has_no_side_effects() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = simulator(&mock)?;
    let before = sim.registry().get(0)?.uptime;

    assert!(matches!(
        sim.publish(0).await,
        Err(PublishError::NotConnected)
    ));
    assert!(mock.published().is_empty());
    assert_eq!(sim.registry().get(0)?.uptime, before);

    Ok(())
}

#[tokio::test]
async fn invalid_selection_has_no_side_effects() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;
    let before: Vec<u64> = sim.registry().iter().map(|d| d.uptime).collect();

    let err = sim.publish(4).await.unwrap_err();
    assert!(matches!(err, PublishError::InvalidSelection(_)));
    assert!(err.to_string().starts_with("invalid selection"));

    assert!(mock.published().is_empty());
    let after: Vec<u64> = sim.registry().iter().map(|d| d.uptime).collect();
    assert_eq!(before, after);

    Ok(())
}

#[tokio::test]
async fn publish_all_goes_in_registry_order() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;

    let results = sim.publish_all().await;
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.is_ok()));

    let expected: Vec<String> = sim
        .registry()
        .iter()
        .flat_map(|d| [topic::data_topic(&d.id), topic::status_topic(&d.id)])
        .collect();
    let topics: Vec<String> = mock.published().into_iter().map(|m| m.topic).collect();
    assert_eq!(topics, expected);

    Ok(())
}

#[tokio::test]
async fn reconnect_recovers_after_drop() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;

    mock.drop_session("broker restarted");
    assert!(matches!(
        sim.publish(0).await,
        Err(PublishError::NotConnected)
    ));

    sim.reconnect().await?;
    sim.publish(0).await?;
    assert_eq!(mock.connect_calls(), 2);
    assert_eq!(mock.published().len(), 2);

    Ok(())
}

#[tokio::test]
async fn command_loop_dispatches_and_survives_bad_input() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;
    let mut out = Vec::new();

    let exit = run_command_loop(
        &mut sim,
        lines("1\nx\n9\nA\n0\n"),
        &mut out,
        CancellationToken::new(),
    )
    .await?;
    sim.shutdown().await;

    let out = String::from_utf8(out)?;
    assert_eq!(exit, LoopExit::Requested);
    assert!(out.contains("[CONNECTED]"));
    assert!(out.contains("[OK] Data sent to MQTT broker!"));
    assert!(out.contains("[ERROR] invalid input 'x', please enter a number"));
    assert!(out.contains("[ERROR] invalid selection"));
    assert!(out.contains("[OK] Sent to all devices!"));
    assert!(out.contains("Exiting..."));

    // One device plus all four.
    assert_eq!(mock.published().len(), 2 + 8);
    assert_eq!(mock.disconnect_calls(), 1);

    Ok(())
}

#[tokio::test]
async fn command_loop_reports_not_connected() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = simulator(&mock)?;
    let mut out = Vec::new();

    let exit = run_command_loop(&mut sim, lines("2\n"), &mut out, CancellationToken::new()).await?;

    let out = String::from_utf8(out)?;
    assert_eq!(exit, LoopExit::InputClosed);
    assert!(out.contains("[DISCONNECTED]"));
    assert!(out.contains("MQTT not connected!"));

    Ok(())
}

#[tokio::test]
async fn command_loop_stops_on_cancel() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;
    // Sender held open so no line ever arrives.
    let (_tx, rx) = mpsc::channel(1);

    let mut out = Vec::new();
    let exit = run_command_loop(&mut sim, rx, &mut out, cancel_after(Duration::from_millis(20)))
        .await?;
    sim.shutdown().await;

    assert_eq!(exit, LoopExit::Interrupted);
    assert!(String::from_utf8(out)?.contains("Interrupted by user."));
    assert_eq!(mock.disconnect_calls(), 1);

    Ok(())
}

#[tokio::test]
async fn blocked_input_does_not_hold_up_interrupt() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;
    let input = spawn_line_reader(BufReader::new(Silent))?;

    let mut out = Vec::new();
    let exit = tokio::time::timeout(
        Duration::from_secs(2),
        run_command_loop(&mut sim, input, &mut out, cancel_after(Duration::from_millis(20))),
    )
    .await??;
    sim.shutdown().await;

    assert_eq!(exit, LoopExit::Interrupted);
    assert_eq!(mock.disconnect_calls(), 1);

    Ok(())
}

#[tokio::test]
async fn listener_receives_device_messages() -> TestResult {
    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;

    let feeder = mock.clone();
    let feed = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let subscriptions = feeder.subscriptions();
        feeder.deliver("iot/devices/abc/data", r#"{"ketinggian_air":10.0}"#);
        feeder.deliver("iot/devices/abc/status", r#"{"battery":90}"#);
        feeder.drop_session("test over");
        subscriptions
    });

    let stats = run_listener(sim.connection(), None, CancellationToken::new()).await?;
    let subscriptions = feed.await?;

    assert_eq!(stats.received, 2);
    assert_eq!(stats.ingested, 0);
    assert_eq!(
        subscriptions,
        vec![topic::ALL_DATA.to_owned(), topic::ALL_STATUS.to_owned()]
    );

    Ok(())
}

/// What the stand-in backend saw for one request.
#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    authorization: Option<String>,
    body: serde_json::Value,
}

/// Minimal HTTP/1.1 responder: ingestion succeeds, notification answers 500.
async fn spawn_backend() -> std::io::Result<(String, Arc<Mutex<Vec<Recorded>>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break None;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break Some(pos + 4);
                }
            };
            let Some(header_end) = header_end else {
                continue;
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
            let header = |name: &str| {
                head.lines().find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    key.eq_ignore_ascii_case(name).then(|| value.trim().to_owned())
                })
            };
            let length: usize = header("content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            while buf.len() < header_end + length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let path = head
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_owned();
            let status = if path.ends_with("/mqtt-data-handler") {
                "200 OK"
            } else {
                "500 Internal Server Error"
            };
            log.lock().unwrap().push(Recorded {
                path,
                authorization: header("authorization"),
                body: serde_json::from_slice(&buf[header_end..]).unwrap_or_default(),
            });

            let response =
                format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });

    Ok((format!("http://{addr}"), seen))
}

#[tokio::test]
async fn listener_forwards_to_backend() -> TestResult {
    let (url, seen) = spawn_backend().await?;
    let mut backend = BackendConfig::with_url(url);
    backend.api_key = "key".to_owned();
    let client = BackendClient::new(backend);

    let mock = MockTransport::accepting();
    let mut sim = connected(&mock).await?;

    let feeder = mock.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        feeder.deliver("iot/devices/abc/data", r#"{"ketinggian_air":10.0}"#);
        feeder.deliver("iot/devices/abc/data", "not json");
        feeder.drop_session("test over");
    });

    let stats = run_listener(sim.connection(), Some(&client), CancellationToken::new()).await?;

    assert_eq!(stats.received, 2);
    assert_eq!(stats.ingested, 2);
    assert_eq!(stats.notified, 0);
    // The notification for the JSON message got a 500.
    assert_eq!(stats.failed, 1);
    // The second payload cannot become a notification.
    assert_eq!(stats.skipped, 1);

    let seen = seen.lock().unwrap().clone();
    let paths: Vec<&str> = seen.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        [
            "/functions/v1/mqtt-data-handler",
            "/functions/v1/telegram-notifications",
            "/functions/v1/mqtt-data-handler",
        ]
    );
    assert!(
        seen.iter()
            .all(|r| r.authorization.as_deref() == Some("Bearer key"))
    );

    assert_eq!(seen[0].body["topic"], "iot/devices/abc/data");
    assert_eq!(seen[0].body["payload"], r#"{"ketinggian_air":10.0}"#);
    assert_eq!(seen[1].body["device_id"], "abc");
    assert_eq!(seen[1].body["event"], "sensor_update");
    assert_eq!(seen[1].body["sensor_data"]["ketinggian_air"], 10.0);
    assert_eq!(seen[2].body["payload"], "not json");

    Ok(())
}
