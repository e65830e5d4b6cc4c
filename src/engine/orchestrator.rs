// ==========================================
// 机加工排产系统 - 排产运行编排
// ==========================================
// 流程:
//   1) 订单按交期升序、优先级降序排序（稳定排序）
//   2) 逐订单排产；订单级错误回滚台账并转为告警
//   3) 完整性错误直接中止整个运行
//   4) 全量校验 + 台账自检
// 生命周期: 一个 SchedulingEngine 对应一次运行，台账随实例丢弃
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::config::settings::GlobalSettings;
use crate::config::shift_calendar::ShiftCalendar;
use crate::domain::error::DomainError;
use crate::domain::interval::{checked_offset, in_planning_range};
use crate::domain::order::Order;
use crate::domain::schedule::{format_timestamp, RunSummary, ScheduleOutput, ScheduleRow, ScheduledOperation};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ledger::LedgerSet;
use crate::engine::order_scheduler::OrderScheduler;
use crate::engine::validator::{ScheduleValidator, ValidationReport};
use chrono::Duration;
use std::collections::BTreeSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// ScheduleRun - 一次排产运行的结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ScheduleRun {
    pub run_id: String,
    pub operations: Vec<ScheduledOperation>,
    pub alerts: Vec<String>,
    pub total_orders: usize,
    pub completed_successfully: usize,
    pub late_orders: usize,
    pub validation: ValidationReport,
}

impl ScheduleRun {
    pub fn into_output(self) -> ScheduleOutput {
        let summary = RunSummary {
            run_id: self.run_id,
            total_orders: self.total_orders,
            total_operations: self.operations.len(),
            completed_successfully: self.completed_successfully,
            late_orders: self.late_orders,
            validation_violations: self.validation.violations.len(),
        };
        ScheduleOutput {
            rows: self.operations.iter().map(ScheduleRow::from).collect(),
            alerts: self.alerts,
            summary,
        }
    }
}

// ==========================================
// SchedulingEngine - 排产引擎
// ==========================================
pub struct SchedulingEngine {
    run_id: Uuid,
    settings: GlobalSettings,
    config: EngineConfig,
    calendar: ShiftCalendar,
}

impl SchedulingEngine {
    /// 创建引擎
    ///
    /// # 返回
    /// - Err(InvalidInput): 班次表/调机窗口无效，参数越界，或时间超出排产范围
    pub fn new(settings: GlobalSettings, config: EngineConfig) -> EngineResult<Self> {
        config.check_bounds().map_err(EngineError::InvalidInput)?;
        check_planning_range(&settings)?;
        let calendar = ShiftCalendar::from_settings(&settings)?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            settings,
            config,
            calendar,
        })
    }

    pub fn run_id(&self) -> String {
        self.run_id.to_string()
    }

    /// 执行排产运行
    ///
    /// # 返回
    /// - Ok(ScheduleRun): 可能包含订单级失败与校验告警
    /// - Err: 仅完整性破坏（致命）
    #[instrument(skip_all, fields(run_id = %self.run_id, orders = orders.len()))]
    pub fn run(self, mut orders: Vec<Order>) -> EngineResult<ScheduleRun> {
        info!(start = %self.settings.start, "排产运行开始");

        orders.sort_by(|a, b| a.due.cmp(&b.due).then(b.priority.cmp(&a.priority)));

        let mut alerts = self.urgent_alerts(&orders)?;
        let known_machines = self.known_machines(&orders);
        let scheduler = OrderScheduler::new(&self.settings, &self.config, &self.calendar, &known_machines);

        let mut ledgers = LedgerSet::new(self.settings.start);
        let mut operations: Vec<ScheduledOperation> = Vec::new();
        let mut completed = 0;
        let mut late = 0;

        for order in &orders {
            let checkpoint = ledgers.clone();
            match scheduler.schedule(&mut ledgers, order) {
                Ok(outcome) => {
                    completed += 1;
                    if outcome.late {
                        late += 1;
                    }
                    operations.extend(outcome.operations);
                    alerts.extend(outcome.alerts);
                }
                Err(err) if err.is_fatal() => {
                    error!(part_number = %order.part_number, error = %err, "排产完整性被破坏，中止运行");
                    return Err(err);
                }
                Err(err) => {
                    ledgers = checkpoint;
                    warn!(part_number = %order.part_number, error = %err, "订单排产失败，已跳过");
                    alerts.push(format!("ORDER_FAILED: part {}: {}", order.part_number, err));
                }
            }
        }

        let validator = ScheduleValidator::new(&self.calendar, self.config.validator_auto_fix)
            .with_breakdowns(&self.settings, &orders);
        let validation = validator.validate(&mut operations);
        alerts.extend(validation.violations.iter().map(|v| format!("VALIDATION: {}", v)));
        ledgers.verify()?;

        info!(
            completed,
            failed = orders.len() - completed,
            operations = operations.len(),
            late_orders = late,
            violations = validation.violations.len(),
            "排产运行完成"
        );

        Ok(ScheduleRun {
            run_id: self.run_id.to_string(),
            operations,
            alerts,
            total_orders: orders.len(),
            completed_successfully: completed,
            late_orders: late,
            validation,
        })
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 交期在紧急阈值内的订单（仅告警，不影响排产）
    fn urgent_alerts(&self, orders: &[Order]) -> EngineResult<Vec<String>> {
        let threshold = checked_offset(self.settings.start, Duration::days(self.config.urgent_horizon_days))?;
        Ok(orders
            .iter()
            .filter(|o| o.due <= threshold)
            .map(|o| {
                format!(
                    "URGENT_ORDER: part {} due {} ({})",
                    o.part_number,
                    format_timestamp(o.due),
                    o.priority
                )
            })
            .collect())
    }

    /// 已知机床: 设置中给出则以设置为准，否则取所有订单可用机床的并集
    fn known_machines(&self, orders: &[Order]) -> BTreeSet<String> {
        if !self.settings.machines.is_empty() {
            return self.settings.machines.iter().cloned().collect();
        }
        orders
            .iter()
            .flat_map(|o| o.operations.iter())
            .flat_map(|op| op.eligible_machines.iter().cloned())
            .collect()
    }
}

/// 排产起点、节假日与故障时段须在排产年份范围内
fn check_planning_range(settings: &GlobalSettings) -> EngineResult<()> {
    let instants = std::iter::once(("start", settings.start))
        .chain(settings.holidays.iter().flat_map(|h| [("holiday", h.start), ("holiday", h.end)]))
        .chain(
            settings
                .breakdowns
                .values()
                .flatten()
                .flat_map(|w| [("breakdown", w.start), ("breakdown", w.end)]),
        );
    for (field, value) in instants {
        if !in_planning_range(value) {
            return Err(DomainError::OutOfPlanningRange {
                field: field.to_string(),
                value,
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Operation;
    use crate::domain::types::Priority;
    use chrono::{NaiveDate, NaiveDateTime};

    fn dt(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn order(part: &str, qty: u32, priority: Priority, due: NaiveDateTime, machine: &str) -> Order {
        let op = Operation::new(10, "Turning", 30.0, 1.0, 1, vec![machine.to_string()]).unwrap();
        Order::new(part, qty, priority, due, vec![op]).unwrap()
    }

    #[test]
    fn test_orders_sorted_by_due_then_priority() {
        let engine = SchedulingEngine::new(GlobalSettings::new(dt(5, 7)), EngineConfig::default()).unwrap();
        let run = engine
            .run(vec![
                order("LATE-DUE", 10, Priority::Urgent, dt(20, 0), "M1"),
                order("LOW", 10, Priority::Low, dt(10, 0), "M1"),
                order("HIGH", 10, Priority::High, dt(10, 0), "M1"),
            ])
            .unwrap();

        let parts: Vec<&str> = run.operations.iter().map(|o| o.part_number.as_str()).collect();
        assert_eq!(parts, vec!["HIGH", "LOW", "LATE-DUE"]);
        assert_eq!(run.completed_successfully, 3);
        assert!(run.validation.is_clean());
    }

    #[test]
    fn test_failed_order_is_isolated() {
        let settings = GlobalSettings::new(dt(5, 7)).with_machines(vec!["M1".to_string()]);
        let engine = SchedulingEngine::new(settings, EngineConfig::default()).unwrap();
        let run = engine
            .run(vec![
                order("BAD", 10, Priority::Normal, dt(10, 0), "M9"),
                order("GOOD", 10, Priority::Normal, dt(11, 0), "M1"),
            ])
            .unwrap();

        assert_eq!(run.total_orders, 2);
        assert_eq!(run.completed_successfully, 1);
        assert!(run.alerts.iter().any(|a| a.starts_with("ORDER_FAILED") && a.contains("BAD")));

        let output = run.into_output();
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.summary.total_operations, 1);
    }

    #[test]
    fn test_urgent_orders_flagged() {
        let engine = SchedulingEngine::new(GlobalSettings::new(dt(5, 7)), EngineConfig::default()).unwrap();
        let run = engine
            .run(vec![
                order("SOON", 10, Priority::Normal, dt(6, 12), "M1"),
                order("LATER", 10, Priority::Normal, dt(15, 0), "M2"),
            ])
            .unwrap();
        let urgent: Vec<&String> = run.alerts.iter().filter(|a| a.starts_with("URGENT_ORDER")).collect();
        assert_eq!(urgent.len(), 1);
        assert!(urgent[0].contains("SOON"));
    }

    #[test]
    fn test_out_of_range_inputs_rejected_at_creation() {
        let config = EngineConfig {
            urgent_horizon_days: 200_000_000,
            ..EngineConfig::default()
        };
        assert!(matches!(
            SchedulingEngine::new(GlobalSettings::new(dt(5, 7)), config),
            Err(EngineError::InvalidInput(_))
        ));

        let far = NaiveDate::from_ymd_opt(200_000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert!(matches!(
            SchedulingEngine::new(GlobalSettings::new(far), EngineConfig::default()),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
