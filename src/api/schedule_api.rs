// ==========================================
// 机加工排产系统 - 排产 API
// ==========================================
// 职责: 原始订单 + 原始设置 → ScheduleOutput
// 约定: 永不向调用方抛错
//   - 单条订单导入失败 → 告警，其余订单继续
//   - 设置无效 / 完整性破坏 → 空结果 + 单条告警
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::engine_config::EngineConfig;
use crate::domain::schedule::ScheduleOutput;
use crate::engine::orchestrator::SchedulingEngine;
use crate::importer::order_importer::OrderImporter;
use crate::importer::raw::{RawOrder, RawSettings};
use crate::importer::settings_importer::import_settings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// 排产请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(default)]
    pub orders: Vec<RawOrder>,
    #[serde(default)]
    pub settings: RawSettings,
    #[serde(default)]
    pub engine_config: HashMap<String, serde_json::Value>,
}

// ==========================================
// ScheduleApi
// ==========================================
#[derive(Debug, Default)]
pub struct ScheduleApi;

impl ScheduleApi {
    pub fn new() -> Self {
        Self
    }

    /// 执行排产（永不失败）
    #[instrument(skip_all, fields(orders = request.orders.len()))]
    pub fn run(&self, request: ScheduleRequest) -> ScheduleOutput {
        let total = request.orders.len();
        match self.try_run(request) {
            Ok(output) => output,
            Err(err) => {
                error!(error = %err, "排产运行失败，返回空结果");
                ScheduleOutput::failed(Uuid::new_v4().to_string(), total, err.to_alert())
            }
        }
    }

    /// JSON 请求 → ScheduleOutput（请求本身无法解析时同样返回单条告警）
    pub fn run_json(&self, json: &str) -> ScheduleOutput {
        match serde_json::from_str::<ScheduleRequest>(json) {
            Ok(request) => self.run(request),
            Err(err) => {
                let err = ApiError::from(err);
                error!(error = %err, "排产请求解析失败");
                ScheduleOutput::failed(Uuid::new_v4().to_string(), 0, err.to_alert())
            }
        }
    }

    /// 执行排产（错误向上传递）
    pub fn try_run(&self, request: ScheduleRequest) -> ApiResult<ScheduleOutput> {
        let settings = import_settings(&request.settings)?;
        let config = EngineConfig::from_values(request.engine_config);

        let imported = OrderImporter::new(&settings).import_all(&request.orders);
        let total = request.orders.len();

        let engine = SchedulingEngine::new(settings, config)?;
        info!(
            run_id = %engine.run_id(),
            imported = imported.orders.len(),
            failed = imported.failures.len(),
            "排产引擎已创建"
        );
        let run = engine.run(imported.orders)?;

        let mut output = run.into_output();
        // 导入失败的订单也计入订单总数
        output.summary.total_orders = total;
        let mut alerts = imported.failures;
        alerts.append(&mut output.alerts);
        output.alerts = alerts;

        info!(
            run_id = %output.summary.run_id,
            rows = output.rows.len(),
            alerts = output.alerts.len(),
            "排产请求处理完成"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"{
        "settings": {"startDateTime": "2025-09-05 07:00"},
        "orders": [
            {
                "partNumber": "P-OK",
                "quantity": 20,
                "priority": "High",
                "dueDate": "2025-09-12",
                "operations": [
                    {"OperationSeq": 10, "OperationName": "Turning", "SetupTime_Min": 30, "CycleTime_Min": 2, "EligibleMachines": "M1,M2"},
                    {"OperationSeq": 20, "OperationName": "Milling", "SetupTime_Min": 20, "CycleTime_Min": 3, "EligibleMachines": ["M3"]}
                ]
            },
            {"partNumber": "P-BAD", "quantity": "many", "dueDate": "2025-09-12"},
            {"partNumber": "P-EMPTY", "quantity": 5, "dueDate": "2025-09-12"}
        ]
    }"#;

    #[test]
    fn test_run_json_end_to_end() {
        let output = ScheduleApi::new().run_json(REQUEST);

        assert_eq!(output.rows.len(), 2);
        assert_eq!(output.summary.total_orders, 3);
        assert_eq!(output.summary.completed_successfully, 1);
        assert_eq!(output.summary.total_operations, 2);
        assert!(output.alerts.iter().any(|a| a.contains("P-BAD")));
        assert!(output.alerts.iter().any(|a| a.contains("P-EMPTY")));
        assert!(!output.summary.run_id.is_empty());

        let row = &output.rows[0];
        assert_eq!(row.part_number, "P-OK");
        assert_eq!(row.setup_start, "2025-09-05 07:00");
        assert_eq!(row.person, "A");
    }

    #[test]
    fn test_invalid_settings_become_single_alert() {
        let output = ScheduleApi::new().run_json(r#"{"settings": {}, "orders": []}"#);
        assert!(output.rows.is_empty());
        assert_eq!(output.alerts.len(), 1);
        assert!(output.alerts[0].starts_with("SCHEDULING_FAILED"));
    }

    #[test]
    fn test_malformed_request() {
        let output = ScheduleApi::new().run_json("not json");
        assert!(output.rows.is_empty());
        assert_eq!(output.alerts.len(), 1);
    }

    #[test]
    fn test_zero_setup_operation_is_scheduled() {
        let output = ScheduleApi::new().run_json(
            r#"{
                "settings": {"startDateTime": "2025-09-05 07:00"},
                "orders": [{
                    "partNumber": "P-WASH",
                    "quantity": 5,
                    "dueDate": "2025-09-12",
                    "operations": [
                        {"OperationSeq": 10, "OperationName": "Wash", "SetupTime_Min": 0, "CycleTime_Min": 2, "EligibleMachines": "M1"}
                    ]
                }]
            }"#,
        );
        assert!(output.alerts.iter().all(|a| !a.starts_with("IMPORT_FAILED")), "{:?}", output.alerts);
        assert_eq!(output.rows.len(), 1);
        let row = &output.rows[0];
        assert_eq!(row.setup_start, "2025-09-05 07:00");
        assert_eq!(row.setup_end, "2025-09-05 07:00");
        assert_eq!(row.run_end, "2025-09-05 07:10");
        assert_eq!(row.person, "-");
    }

    #[test]
    fn test_extreme_values_do_not_panic() {
        let output = ScheduleApi::new().run_json(
            r#"{
                "settings": {"startDateTime": "2025-09-05 07:00"},
                "engineConfig": {"run.urgent_horizon_days": "200000000", "operator.search_horizon_days": 99999999},
                "orders": [
                    {
                        "partNumber": "P-HUGE",
                        "quantity": 5,
                        "dueDate": "2025-09-12",
                        "operations": [
                            {"OperationSeq": 10, "SetupTime_Min": 1e12, "CycleTime_Min": 2, "EligibleMachines": "M1"}
                        ]
                    },
                    {
                        "partNumber": "P-FINE",
                        "quantity": 5,
                        "dueDate": "2025-09-12",
                        "operations": [
                            {"OperationSeq": 10, "SetupTime_Min": 10, "CycleTime_Min": 2, "EligibleMachines": "M1"}
                        ]
                    }
                ]
            }"#,
        );
        assert!(output
            .alerts
            .iter()
            .any(|a| a.starts_with("IMPORT_FAILED") && a.contains("P-HUGE")));
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.rows[0].part_number, "P-FINE");
    }

    #[test]
    fn test_output_serializes_camel_case() {
        let output = ScheduleApi::new().run_json(REQUEST);
        let json = serde_json::to_value(&output).unwrap();
        assert!(json["rows"][0]["partNumber"].is_string());
        assert!(json["rows"][0]["firstPieceDone"].is_string());
        assert!(json["summary"]["completedSuccessfully"].is_number());
    }
}
