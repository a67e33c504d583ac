//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Config file to running dispatcher
//! - Mock e2e runs (no upstream required): acquisition loop into real sinks

#[cfg(test)]
mod contract_tests {
    use contracts::{AuxKind, RecordKind, SinkRecord};
    use serde_json::json;

    #[test]
    fn test_record_kinds_cover_all_variants() {
        let records = [
            SinkRecord::line("timestamp,speed"),
            SinkRecord::document("tesla_aux", json!({})),
            SinkRecord::Publish {
                topic: "teslams/stream".into(),
                payload: "{}".into(),
                retain: true,
            },
        ];
        let kinds: Vec<RecordKind> = records.iter().map(SinkRecord::kind).collect();
        assert_eq!(kinds, RecordKind::ALL);
    }

    #[test]
    fn test_sample_sub_states_pass_schema_checks() {
        for kind in AuxKind::ALL {
            let payload = vehicle_api::sample_sub_state(kind);
            assert!(kind.validate(&payload).is_ok(), "{kind:?} sample rejected");
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::net::UdpSocket;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use acquisition::{Clock, CountersSnapshot, Orchestrator};
    use config_loader::ConfigLoader;
    use contracts::{AcquisitionConfig, ChannelEvent, SinkRecord, AUX_COLLECTION, STREAM_COLLECTION};
    use dispatcher::{create_dispatcher, MetricsSnapshot};
    use serde_json::Value;
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Instant};
    use vehicle_api::{MockTransport, MockVehicleApi};

    const BASE_MILLIS: i64 = 1_700_000_000_000;

    /// Wall clock that moves with tokio's (possibly paused) clock
    struct FollowClock {
        origin: Instant,
    }

    impl Clock for FollowClock {
        fn now_millis(&self) -> i64 {
            BASE_MILLIS + self.origin.elapsed().as_millis() as i64
        }
    }

    fn write_config(dir: &Path, body: &str) -> AcquisitionConfig {
        let path = dir.join("teslastream.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        ConfigLoader::load_from_path(&path).unwrap()
    }

    fn read_jsonl(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    struct Run {
        counters: CountersSnapshot,
        sinks: Vec<(String, MetricsSnapshot)>,
    }

    /// Run the loop against the mock upstream, letting `drive` inject
    /// stream traffic, then shut down and wait for the sinks to drain
    async fn run_mock<F>(config: &AcquisitionConfig, transport: Arc<MockTransport>, drive: F) -> Run
    where
        F: FnOnce(&MockTransport),
    {
        let api = Arc::new(MockVehicleApi::demo());
        let (records_tx, records_rx) = mpsc::channel::<SinkRecord>(100);
        let dispatcher = create_dispatcher(config.sinks.clone(), records_rx)
            .await
            .unwrap();
        let dispatcher_handle = dispatcher.spawn();

        let clock = FollowClock {
            origin: Instant::now(),
        };
        let orchestrator = Orchestrator::new(config, api, transport.clone(), clock, records_tx);
        let counters = orchestrator.counters();
        let task = tokio::spawn(orchestrator.run());

        sleep(Duration::from_millis(10)).await;
        drive(transport.as_ref());
        sleep(Duration::from_millis(10)).await;

        // Dropping the loop releases the record sender
        task.abort();
        let _ = task.await;

        let sinks = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .expect("dispatcher did not drain")
            .unwrap();

        Run {
            counters: counters.snapshot(),
            sinks,
        }
    }

    /// End-to-end: mock upstream -> Orchestrator -> Dispatcher -> file + document sinks
    ///
    /// Verifies the full flow:
    /// 1. First Ready writes the vehicle list document and the CSV header
    /// 2. One-time vehicle info lands in the aux collection
    /// 3. Stream lines go to the CSV file, moving frames to the stream collection
    #[tokio::test(start_paused = true)]
    async fn test_e2e_stream_into_files() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("out/stream.csv");
        let docs = dir.path().join("docs");
        let config = write_config(
            dir.path(),
            &format!(
                r#"
[account]
email = "owner@example.com"

[acquisition]
max_requests_per_minute = 10

[[sinks]]
name = "csv"
sink_type = "file"
params = {{ path = "{}" }}

[[sinks]]
name = "docs"
sink_type = "document"
params = {{ dir = "{}" }}
"#,
                csv.display(),
                docs.display()
            ),
        );

        let parked = "1700000000500,,12345.6,78,12,270,37.49,-121.94,270,0,,201,195";
        let driving = "1700000001000,25,12345.8,77,13,272,37.4931,-121.9444,272,35,D,200,194";

        let run = run_mock(&config, Arc::new(MockTransport::new()), |transport| {
            assert!(transport.emit(1, ChannelEvent::Open));
            assert!(transport.emit_update(1, parked));
            assert!(transport.emit_update(1, driving));
        })
        .await;

        assert_eq!(run.counters.ready_transitions, 1);
        assert_eq!(run.counters.frames_decoded, 2);
        assert_eq!(run.counters.records_dropped, 0);

        let lines: Vec<String> = std::fs::read_to_string(&csv)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines, vec![config.acquisition.csv_header(), parked.into(), driving.into()]);

        let aux = read_jsonl(&docs.join(format!("{AUX_COLLECTION}.jsonl")));
        // vehicle list entry plus the one-time vehicle_state and gui_settings
        assert_eq!(aux.len(), 3, "{aux:#?}");
        assert!(aux.iter().any(|d| d.get("vehicles").is_some()));
        assert!(aux.iter().any(|d| d.get("guiSettings").is_some()));

        let frames = read_jsonl(&docs.join(format!("{STREAM_COLLECTION}.jsonl")));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["ts"], 1_700_000_001_000u64);
        assert_eq!(frames[0]["shift_state"], "D");

        let total_failures: u64 = run.sinks.iter().map(|(_, m)| m.failure_count).sum();
        assert_eq!(total_failures, 0);
    }

    /// Stream frames are published over UDP with the retain flag
    #[tokio::test(start_paused = true)]
    async fn test_e2e_stream_published_over_udp() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        let dir = tempdir().unwrap();
        let config = write_config(
            dir.path(),
            &format!(
                r#"
[account]
email = "owner@example.com"

[endpoints]
publish_topic = "garage"

[[sinks]]
name = "udp"
sink_type = "network"
params = {{ addr = "{addr}" }}
"#
            ),
        );

        let driving = "1700000001000,25,12345.8,77,13,272,37.4931,-121.9444,272,35,D,200,194";
        let run = run_mock(&config, Arc::new(MockTransport::new()), |transport| {
            transport.emit(1, ChannelEvent::Open);
            transport.emit_update(1, driving);
        })
        .await;

        assert_eq!(run.sinks[0].1.write_count, 1);

        let mut buf = [0u8; 2048];
        let len = receiver.recv(&mut buf).unwrap();
        let datagram: Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(datagram["topic"], "garage/stream");
        assert_eq!(datagram["retain"], true);
        let payload: Value = serde_json::from_str(datagram["payload"].as_str().unwrap()).unwrap();
        assert_eq!(payload["speed"], 25.0);
    }

    /// Aux mode never opens the stream and leaves the flat file empty
    #[tokio::test(start_paused = true)]
    async fn test_e2e_aux_mode_skips_stream() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("stream.csv");
        let config = write_config(
            dir.path(),
            &format!(
                r#"
[account]
email = "owner@example.com"

[acquisition]
mode = "aux"

[[sinks]]
name = "csv"
sink_type = "file"
params = {{ path = "{}" }}

[[sinks]]
name = "console"
sink_type = "log"
"#,
                csv.display()
            ),
        );

        let transport = Arc::new(MockTransport::new());
        let run = run_mock(&config, transport.clone(), |_| {}).await;

        assert_eq!(transport.open_count(), 0);
        assert_eq!(run.counters.stream_connects, 0);
        assert_eq!(run.counters.ready_transitions, 1);
        assert_eq!(run.counters.snapshots_emitted, 2);

        let contents = std::fs::read_to_string(&csv).unwrap();
        assert!(contents.is_empty(), "got: {contents}");
    }
}
