// ==========================================
// 机加工排产系统 - 订单导入
// ==========================================
// 职责: RawOrder → Order
//   1) 数值字段（数字或文本）转强类型
//   2) 机床列表拆分、去重
//   3) 按工序名称应用全局工序覆写
//   4) 订单级开工时间 / 故障机床 / 调机窗口 / 分批模式
// 单条订单导入失败不影响其他订单，失败原因转为告警
// ==========================================

use crate::config::settings::{GlobalSettings, OperationOverride};
use crate::domain::order::{Breakdown, Operation, Order};
use crate::domain::types::{BatchMode, Priority};
use crate::importer::datetime_parser::{parse_datetime, parse_due, parse_range};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::raw::{NumberOrText, RawOperation, RawOrder};
use crate::importer::settings_importer::daily_window;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, instrument, warn};

/// 批量导入结果
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub orders: Vec<Order>,
    pub failures: Vec<String>,
}

/// 从 JSON 文本解析原始订单数组
pub fn parse_orders_json(json: &str) -> ImportResult<Vec<RawOrder>> {
    Ok(serde_json::from_str(json)?)
}

/// 从文件加载原始订单
pub fn load_orders(path: &Path) -> ImportResult<Vec<RawOrder>> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    let json = fs::read_to_string(path)?;
    parse_orders_json(&json)
}

// ==========================================
// OrderImporter
// ==========================================
pub struct OrderImporter<'a> {
    overrides: &'a HashMap<String, OperationOverride>,
}

impl<'a> OrderImporter<'a> {
    pub fn new(settings: &'a GlobalSettings) -> Self {
        Self {
            overrides: &settings.operation_overrides,
        }
    }

    /// 批量导入（失败订单记录原因后跳过）
    pub fn import_all(&self, raws: &[RawOrder]) -> ImportOutcome {
        let mut outcome = ImportOutcome::default();
        for raw in raws {
            match self.import(raw) {
                Ok(order) => outcome.orders.push(order),
                Err(err) => {
                    warn!(part_number = %raw.part_number, error = %err, "订单导入失败");
                    outcome
                        .failures
                        .push(format!("IMPORT_FAILED: part {}: {}", raw.part_number, err));
                }
            }
        }
        info!(
            imported = outcome.orders.len(),
            failed = outcome.failures.len(),
            "订单导入完成"
        );
        outcome
    }

    /// 导入单条订单
    #[instrument(skip_all, fields(part_number = %raw.part_number))]
    pub fn import(&self, raw: &RawOrder) -> ImportResult<Order> {
        let part = raw.part_number.trim();
        if part.is_empty() {
            return Err(ImportError::MissingField {
                record: "order".to_string(),
                field: "partNumber".to_string(),
            });
        }

        let quantity = integer(part, "quantity", &raw.quantity)?;
        let priority = raw
            .priority
            .as_deref()
            .map(Priority::from_label)
            .unwrap_or_default();
        let due = parse_due("dueDate", &raw.due_date)?;
        let operations = raw
            .operations
            .iter()
            .map(|op| self.import_operation(part, op))
            .collect::<ImportResult<Vec<_>>>()?;

        let mut order = Order::new(part, quantity, priority, due, operations)
            .map_err(|e| ImportError::domain(part, e))?;

        if let Some(start) = non_empty(&raw.start_date_time) {
            order = order.with_start(parse_datetime("startDateTime", start)?);
        }
        if let Some(machine) = non_empty(&raw.breakdown_machine) {
            let window = non_empty(&raw.breakdown_date_time)
                .map(|s| parse_range("breakdownDateTime", s))
                .transpose()?;
            order = order.with_breakdown(Breakdown {
                machine: machine.trim().to_string(),
                window,
            });
        }
        if let Some(window) = &raw.setup_window {
            order = order.with_setup_window(daily_window("setupWindow", window)?);
        }
        if let Some(mode) = non_empty(&raw.batch_mode) {
            let custom = raw
                .custom_batch_size
                .as_ref()
                .map(|v| integer(part, "customBatchSize", v))
                .transpose()?;
            order = order.with_batch_mode(BatchMode::from_label(mode), custom);
        }

        Ok(order)
    }

    fn import_operation(&self, part: &str, raw: &RawOperation) -> ImportResult<Operation> {
        let record = format!("{}.operations", part);
        let seq = integer(&record, "OperationSeq", &raw.seq)?;
        let name = match raw.name.trim() {
            "" => format!("OP{}", seq),
            n => n.to_string(),
        };
        let overrides = self.overrides.get(&name);

        let setup = match overrides.and_then(|o| o.setup_minutes) {
            Some(m) => m,
            None => number(&record, "SetupTime_Min", &raw.setup_minutes)?,
        };
        let cycle = match overrides.and_then(|o| o.cycle_minutes) {
            Some(m) => m,
            None => number(&record, "CycleTime_Min", &raw.cycle_minutes)?,
        };
        let machines = match overrides.and_then(|o| o.eligible_machines.clone()) {
            Some(m) => m,
            None => raw.eligible_machines.items(),
        };
        let min_batch = match &raw.min_batch_size {
            Some(v) => integer(&record, "Minimum_BatchSize", v)?,
            None => 1,
        };

        Operation::new(seq, name, setup, cycle, min_batch, machines)
            .map_err(|e| ImportError::domain(record, e))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn number(record: &str, field: &str, value: &NumberOrText) -> ImportResult<f64> {
    value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| invalid(record, field, value))
}

/// 非负整数
fn integer(record: &str, field: &str, value: &NumberOrText) -> ImportResult<u32> {
    let n = number(record, field, value)?;
    if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
        return Err(invalid(record, field, value));
    }
    Ok(n as u32)
}

fn invalid(record: &str, field: &str, value: &NumberOrText) -> ImportError {
    ImportError::InvalidValue {
        record: record.to_string(),
        field: field.to_string(),
        value: value.raw(),
    }
}
