use chrono::Utc;
use ek_protocol::*;
use serde_json::json;
use uuid::Uuid;

fn sample_process() -> Process {
    Process {
        id: Uuid::new_v4(),
        step_name: StepName::BuildDescription,
        sheet_name: "Structured Data".to_string(),
        channel_token: "session_abc".to_string(),
        stats: ProcessStats {
            total: 100,
            processed: 10,
            success: 10,
            errors: 0,
            skipped: 40,
            initial_empty_rows: Some(60),
            empty_rows_reported: true,
        },
        progress: 16.5,
        elapsed_time: 12,
        start_time: Utc::now(),
        is_active: true,
        is_completed: false,
        is_cancelled: false,
        error: None,
        history_saved: false,
        origin: ViewRole::Home,
        filled_row_indices: Vec::new(),
    }
}

#[test]
fn test_channel_message_from_server_frame() {
    let frame = r#"{
        "type": "progress",
        "step": "Build Description",
        "total": 100,
        "processed": 12,
        "success": 10,
        "errors": 2,
        "skipped": 40
    }"#;

    let message: ChannelMessage = serde_json::from_str(frame).expect("Failed to parse frame");

    assert_eq!(message.kind, ChannelMessageKind::Progress);
    assert_eq!(message.total, 100);
    assert_eq!(message.success, 10);
    assert_eq!(message.errors, 2);
    assert_eq!(message.skipped, 40);
    assert_eq!(message.step.as_deref(), Some("Build Description"));
}

#[test]
fn test_error_frame_without_counters() {
    // Error frames only carry step and message.
    let frame = r#"{"type": "error", "step": "AI Source Comparables", "message": "quota exceeded"}"#;

    let message: ChannelMessage = serde_json::from_str(frame).expect("Failed to parse frame");

    assert_eq!(message.kind, ChannelMessageKind::Error);
    assert_eq!(message.total, 0);
    assert_eq!(message.message.as_deref(), Some("quota exceeded"));
}

#[test]
fn test_pong_frame_is_not_a_channel_message() {
    let frame = r#"{"type": "pong", "data": "ping"}"#;
    assert!(serde_json::from_str::<ChannelMessage>(frame).is_err());
}

#[test]
fn test_process_persists_with_camel_case_keys() {
    let process = sample_process();
    let value = serde_json::to_value(&process).expect("Failed to serialize Process");

    assert_eq!(value["stepName"], json!("Build Description"));
    assert_eq!(value["channelToken"], json!("session_abc"));
    assert_eq!(value["stats"]["initialEmptyRows"], json!(60));
    assert_eq!(value["stats"]["emptyRowsReported"], json!(true));
    assert_eq!(value["isActive"], json!(true));
    assert_eq!(value["historySaved"], json!(false));
    assert_eq!(value["origin"], json!("home"));

    let restored: Process = serde_json::from_value(value).expect("Failed to deserialize Process");
    assert_eq!(restored, process);
}

#[test]
fn test_process_tolerates_missing_optional_fields() {
    // A record written by an older front-end has no error/latch/row fields.
    let value = json!({
        "id": Uuid::new_v4(),
        "stepName": "Generate AI Data",
        "channelToken": "session_x",
        "startTime": "2026-01-01T00:00:00Z",
        "isActive": true,
        "origin": "monitor"
    });

    let process: Process = serde_json::from_value(value).expect("Failed to deserialize Process");

    assert_eq!(process.step_name, StepName::GenerateAiData);
    assert_eq!(process.stats, ProcessStats::default());
    assert!(process.stats.initial_empty_rows.is_none());
    assert!(!process.history_saved);
    assert_eq!(process.status(), ProcessStatus::Running);
}

#[test]
fn test_status_is_derived_from_flags() {
    let mut process = sample_process();
    assert_eq!(process.status(), ProcessStatus::Running);

    process.is_active = false;
    process.error = Some("boom".to_string());
    assert_eq!(process.status(), ProcessStatus::Failed);
    assert!(process.is_terminal());

    process.error = None;
    process.is_cancelled = true;
    assert_eq!(process.status(), ProcessStatus::Cancelled);
}

#[test]
fn test_job_request_uses_backend_field_names() {
    let request = JobRequest {
        sheet_id: "1AbC".to_string(),
        step: StepName::AiSimilarComparable,
        sheet_name: None,
        session_id: "session_abc".to_string(),
        custom_prompt: Some("Be brief".to_string()),
    };

    let value = serde_json::to_value(&request).expect("Failed to serialize JobRequest");

    assert_eq!(value["sheetId"], json!("1AbC"));
    assert_eq!(value["step"], json!("AI Similar Comparable"));
    assert_eq!(value["session_id"], json!("session_abc"));
    assert_eq!(value["custom_prompt"], json!("Be brief"));
}

#[test]
fn test_history_entry_omits_unassigned_id() {
    let entry = HistoryEntry {
        id: None,
        sheet_name: "Structured Data".to_string(),
        step: Some("Build Description".to_string()),
        message: "Build Description completed".to_string(),
        timestamp: "2026-01-01T00:00:00Z".to_string(),
        time: "1m 05s".to_string(),
    };

    let value = serde_json::to_value(&entry).expect("Failed to serialize HistoryEntry");
    assert!(value.get("id").is_none());
}

#[test]
fn test_shared_record_uses_backend_field_names() {
    let process = sample_process();
    let record = SharedProcessRecord::from(&process);
    let value = serde_json::to_value(&record).unwrap();

    assert_eq!(value["process_id"], json!(process.id.to_string()));
    assert_eq!(value["step_name"], "Build Description");
    assert_eq!(value["session_id"], "session_abc");
    assert_eq!(value["is_active"], true);
    assert_eq!(value["start_time"], json!(process.start_time.timestamp_millis()));
    assert_eq!(value["stats"]["initialEmptyRows"], 60);

    // Stored rows come back with the backend's own bookkeeping columns.
    let stored = json!({
        "id": 7,
        "process_id": process.id.to_string(),
        "step_name": "Build Description",
        "sheet_name": "Structured Data",
        "session_id": "session_abc",
        "stats": {"total": 100, "success": 10},
        "is_completed": true,
        "is_active": false,
        "progress": 100.0,
        "start_time": 1767225600000_i64,
        "updated_at": "2026-01-01T00:00:00"
    });
    let parsed: SharedProcessRecord = serde_json::from_value(stored).unwrap();
    assert_eq!(parsed.process_id, process.id);
    assert_eq!(parsed.stats.success, 10);
    assert_eq!(parsed.elapsed_time, 0);
    assert!(parsed.is_completed);
}

#[test]
fn test_op_serialization() {
    let op = Op::LaunchJob {
        sheet_id: "1AbC".to_string(),
        step: StepName::BuildDescription,
        sheet_name: Some("Structured Data".to_string()),
        prompt_override: None,
    };

    let json = serde_json::to_string(&op).expect("Failed to serialize Op");
    assert!(json.contains(r#""type":"launchJob""#));
    assert!(json.contains(r#""payload""#));

    let deserialized: Op = serde_json::from_str(&json).expect("Failed to deserialize Op");
    assert_eq!(deserialized, op);

    let unit = serde_json::to_string(&Op::GetDashboardState).expect("Failed to serialize Op");
    assert_eq!(unit, r#"{"type":"getDashboardState"}"#);
}

#[test]
fn test_event_serialization() {
    let process_id = Uuid::new_v4();
    let event = Event::ProcessFailed {
        process_id,
        error: "quota exceeded".to_string(),
    };

    let json = serde_json::to_string(&event).expect("Failed to serialize Event");
    assert!(json.contains(r#""type":"processFailed""#));
    assert!(json.contains(&process_id.to_string()));
}

#[test]
fn test_global_config_defaults_from_partial_toml() {
    let toml_str = r#"
history_limit = 25

[timing]
grace_period_ms = 2000
"#;

    let config: GlobalConfig = toml::from_str(toml_str).expect("Failed to parse GlobalConfig");

    assert_eq!(config.history_limit, 25);
    assert_eq!(config.timing.grace_period_ms, 2000);
    assert_eq!(config.timing.poll_interval_ms, 500);
    assert_eq!(config.timing.ticker_interval_ms, 1000);
    assert_eq!(config.backend, BackendSettings::default());
    assert_eq!(config.storage.dir, ".enrich-kit/state");
}
