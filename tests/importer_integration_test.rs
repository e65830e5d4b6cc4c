// ==========================================
// 导入集成测试
// ==========================================
// 职责: 文件加载 → 设置/订单导入 → API 端到端排产
// ==========================================


use machining_aps::api::{ScheduleApi, ScheduleRequest};
use machining_aps::importer::{load_orders, load_settings, ImportError, OrderImporter, RawSettings};
use tempfile::TempDir;
use test_helpers::*;

const SETTINGS: &str = r#"{
    "startDateTime": "2025-09-05 07:00",
    "holidays": ["2025-09-07"],
    "breakdownMachines": "M9",
    "setupWindow": "06:00-22:00",
    "productionWindow": "24x7",
    "operationOverrides": {
        "Deburr": {"cycleMinutes": 0.5}
    }
}"#;

const ORDERS: &str = r#"[
    {
        "partNumber": "FILE-1",
        "quantity": 40,
        "priority": "High",
        "dueDate": "2025-09-12",
        "operations": [
            {"OperationSeq": 10, "OperationName": "Turning", "SetupTime_Min": 45, "CycleTime_Min": 2.5, "EligibleMachines": ["M1", "M2"]},
            {"OperationSeq": 20, "OperationName": "Deburr", "SetupTime_Min": 15, "CycleTime_Min": 4, "EligibleMachines": "M3, M9"}
        ]
    },
    {
        "partNumber": "FILE-BAD",
        "quantity": "many",
        "dueDate": "2025-09-12",
        "operations": [
            {"OperationSeq": 10, "SetupTime_Min": 10, "CycleTime_Min": 1, "EligibleMachines": ["M1"]}
        ]
    }
]"#;

#[test]
fn test_load_settings_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_json(&dir, "settings.json", SETTINGS);

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.start, at(5, 7, 0));
    assert_eq!(settings.holidays.len(), 1);
    assert!(settings.breakdowns.contains_key("M9"));
    assert!(settings.operation_overrides.contains_key("Deburr"));
    assert_eq!(settings.roster.len(), 4);
}

#[test]
fn test_load_orders_and_import() {
    let dir = TempDir::new().unwrap();
    let settings = load_settings(&write_json(&dir, "settings.json", SETTINGS)).unwrap();
    let raws = load_orders(&write_json(&dir, "orders.json", ORDERS)).unwrap();
    assert_eq!(raws.len(), 2);

    let outcome = OrderImporter::new(&settings).import_all(&raws);
    assert_eq!(outcome.orders.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].starts_with("IMPORT_FAILED: part FILE-BAD"));

    let imported = &outcome.orders[0];
    assert_eq!(imported.due, at(12, 23, 59));
    // 覆写按工序名生效
    assert_eq!(imported.operations[1].cycle_minutes, 0.5);
    assert_eq!(imported.operations[1].eligible_machines, vec!["M3", "M9"]);
}

#[test]
fn test_missing_files_are_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");
    assert!(matches!(load_orders(&missing), Err(ImportError::FileNotFound(_))));
    assert!(matches!(load_settings(&missing), Err(ImportError::FileNotFound(_))));
}

#[test]
fn test_api_end_to_end_from_files() {
    let dir = TempDir::new().unwrap();
    let orders = load_orders(&write_json(&dir, "orders.json", ORDERS)).unwrap();
    let settings: RawSettings = serde_json::from_str(SETTINGS).unwrap();

    let output = ScheduleApi::new().run(ScheduleRequest {
        orders,
        settings,
        ..Default::default()
    });

    assert_eq!(output.summary.total_orders, 2);
    assert_eq!(output.summary.completed_successfully, 1);
    assert_eq!(output.rows.len(), 2);
    assert!(output.alerts.iter().any(|a| a.starts_with("IMPORT_FAILED")));

    // 故障机床 M9 不被选用
    assert_eq!(output.rows[1].machine, "M3");
    assert_eq!(output.rows[0].setup_start, "2025-09-05 07:00");
    assert_eq!(output.summary.late_orders, 0);
}

#[test]
fn test_api_reports_invalid_settings_as_single_alert() {
    let output = ScheduleApi::new().run_json(
        r#"{"settings": {"startDateTime": "not a date"}, "orders": []}"#,
    );
    assert!(output.rows.is_empty());
    assert_eq!(output.alerts.len(), 1);
    assert!(output.alerts[0].starts_with("SCHEDULING_FAILED"));
}
