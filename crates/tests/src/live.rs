//! Live UDP capture through the whole pipeline

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use contracts::{columns, RunConfig, RunOutcome, SourceConfig};
use ingestion::{make_frame, LiveDecoder};
use insertion::MemorySink;
use pipeline::PipelineController;
use postprocess::FixedClock;
use serde_json::json;
use tokio::net::UdpSocket;

use crate::fixtures::*;

fn live_config() -> RunConfig {
    serde_json::from_value(json!({
        "source": {
            "type": "live",
            "chunk_interval_ms": 20,
            "endpoints": [{"sensor": "psr_north", "bind": "127.0.0.1:0"}]
        },
        "backpressure": {"live_max_in_flight": 4},
        "record_kinds": [{
            "name": "plot",
            "tod_path": "tod",
            "columns": [{"path": "n", "column": "n", "kind": "u32"}]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_live_capture_truncates_future_records() {
    let config = live_config();
    let SourceConfig::Live(live) = &config.source else {
        unreachable!()
    };
    let decoder = LiveDecoder::bind(live).await.unwrap();
    let target = decoder.local_addrs()[0];

    let noon = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let (sink, handle) = MemorySink::new("memory");
    let mut controller =
        PipelineController::new(config.clone()).with_clock(Arc::new(FixedClock(noon)));
    controller.start(decoder, sink).unwrap();
    assert_eq!(controller.is_live(), Some(true));

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for n in 0..5u32 {
        let frame = make_frame("plot", vec![json!({"tod": 43_200.0 + n as f64, "n": n})]);
        socket
            .send_to(&serde_json::to_vec(&frame).unwrap(), target)
            .await
            .unwrap();
    }
    socket.send_to(b"not json", target).await.unwrap();
    // 1000 s ahead of the clock, beyond the slack
    let future = make_frame("plot", vec![json!({"tod": 44_200.0, "n": 99})]);
    socket
        .send_to(&serde_json::to_vec(&future).unwrap(), target)
        .await
        .unwrap();

    assert!(
        eventually(Duration::from_secs(3), || {
            handle.row_count() >= 5 && controller.metrics().snapshot().future_rows_truncated >= 1
        })
        .await
    );
    assert_eq!(controller.stop().await.unwrap(), RunOutcome::Stopped);

    let chunks = handle.take();
    let mut ns = collect::<u32>(&chunks, "plot", "n");
    ns.sort_unstable();
    assert_eq!(ns, vec![0, 1, 2, 3, 4]);

    let sensors = collect::<String>(&chunks, "plot", columns::SENSOR_ID);
    assert!(sensors.iter().all(|s| s == "psr_north"));

    let mut stamps = collect::<i64>(&chunks, "plot", columns::TIMESTAMP);
    stamps.sort_unstable();
    assert_eq!(stamps[0], DAY_ONE_MS + 43_200_000);
    assert_eq!(stamps[4], DAY_ONE_MS + 43_204_000);

    let snapshot = controller.metrics().snapshot();
    assert_eq!(snapshot.future_rows_truncated, 1);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn test_live_pause_then_offline() {
    let config = live_config();
    let SourceConfig::Live(live) = &config.source else {
        unreachable!()
    };
    let decoder = LiveDecoder::bind(live).await.unwrap();
    let target = decoder.local_addrs()[0];

    let (sink, handle) = MemorySink::new("memory");
    let mut controller = PipelineController::new(config.clone())
        .with_clock(Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())));
    controller.start(decoder, sink).unwrap();
    controller.pause().unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let frame = make_frame("plot", vec![json!({"tod": 43_200.0, "n": 1})]);
    socket
        .send_to(&serde_json::to_vec(&frame).unwrap(), target)
        .await
        .unwrap();
    assert!(
        eventually(Duration::from_secs(2), || {
            controller.metrics().snapshot().paused_discards >= 1
        })
        .await
    );
    assert_eq!(handle.row_count(), 0);

    controller.resume().unwrap();
    socket
        .send_to(&serde_json::to_vec(&frame).unwrap(), target)
        .await
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || handle.row_count() == 1).await);

    assert_eq!(controller.go_offline().await.unwrap(), RunOutcome::Stopped);
    assert!(!controller.is_running());
}
