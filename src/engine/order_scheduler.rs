// ==========================================
// 机加工排产系统 - 单订单排产
// ==========================================
// 职责: 批次 × 工序 编排
//   批次按分批顺序，工序按 seq 严格顺序
//   下游工序以同批次上游首件完工为触发点（单件流）
// 预占: 机床 [调机开始, 加工结束)，操作工 [调机开始, 调机结束)（按片段）
// 完成后: 最后工序结束晚于交期 → 交期风险告警
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::config::settings::GlobalSettings;
use crate::config::shift_calendar::ShiftCalendar;
use crate::domain::interval::{in_planning_range, Interval};
use crate::domain::order::{Batch, Downtime, Operation, Order};
use crate::domain::schedule::{format_timestamp, ScheduledOperation};
use crate::engine::batch_planner::BatchPlanner;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ledger::LedgerSet;
use crate::engine::machine_selector::{MachineRequest, MachineSelector, SelectionRule};
use crate::engine::operator_selector::{OperatorAssignment, OperatorSelector};
use crate::engine::timing::{RunTiming, TimingCalculator, UpstreamFlow};
use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

const MS_PER_HOUR: i64 = 3_600_000;

// 故障复核的最大重选次数
const MAX_BREAKDOWN_RETRIES: usize = 32;

// 无调机工序的操作工展示
pub const NO_OPERATOR: &str = "-";

/// 未预占的工序计划
struct OperationPlan {
    setup_start: NaiveDateTime,
    setup_end: NaiveDateTime,
    assignment: Option<OperatorAssignment>,
    run: RunTiming,
}

/// 单订单排产结果
#[derive(Debug, Clone, Default)]
pub struct OrderOutcome {
    pub operations: Vec<ScheduledOperation>,
    pub alerts: Vec<String>,
    pub late: bool,
}

// ==========================================
// OrderScheduler
// ==========================================
pub struct OrderScheduler<'a> {
    settings: &'a GlobalSettings,
    config: &'a EngineConfig,
    calendar: &'a ShiftCalendar,
    known_machines: &'a BTreeSet<String>,
    planner: BatchPlanner,
}

impl<'a> OrderScheduler<'a> {
    pub fn new(
        settings: &'a GlobalSettings,
        config: &'a EngineConfig,
        calendar: &'a ShiftCalendar,
        known_machines: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            settings,
            config,
            calendar,
            known_machines,
            planner: BatchPlanner::new(config.custom_batch_size),
        }
    }

    /// 排产单个订单
    ///
    /// 失败时台账可能已部分写入，由调用方负责回滚
    #[instrument(skip_all, fields(part_number = %order.part_number, qty = order.quantity))]
    pub fn schedule(&self, ledgers: &mut LedgerSet, order: &Order) -> EngineResult<OrderOutcome> {
        self.validate(order)?;

        // 订单级调机窗口覆写
        let calendar: Cow<'_, ShiftCalendar> = match order.setup_window {
            Some(window) => Cow::Owned(self.calendar.with_setup_window(window)?),
            None => Cow::Borrowed(self.calendar),
        };

        let batches = self.planner.plan_for_order(order);
        let order_start = order.start_override.unwrap_or(self.settings.start);
        let mut outcome = OrderOutcome::default();
        let mut completion: Option<NaiveDateTime> = None;

        for batch in &batches {
            let mut upstream: Option<UpstreamFlow> = None;
            for op in &order.operations {
                let earliest = upstream
                    .as_ref()
                    .map(|up| up.first_piece_done)
                    .unwrap_or(order_start);
                let scheduled =
                    self.schedule_operation(ledgers, &calendar, order, batch, op, earliest, upstream.as_ref())?;

                upstream = Some(UpstreamFlow {
                    piece_completions: scheduled.piece_completions.clone(),
                    first_piece_done: scheduled.first_piece_done,
                    run_end: scheduled.run.end,
                });
                if scheduled.operator_emergency {
                    outcome.alerts.push(format!(
                        "OPERATOR_EMERGENCY: part {} batch {} op {} setup delayed to {} by {}",
                        order.part_number,
                        batch.id,
                        op.seq,
                        format_timestamp(scheduled.setup.start),
                        scheduled.operator
                    ));
                }
                outcome.operations.push(scheduled);
            }
            if let Some(up) = &upstream {
                completion = Some(completion.map_or(up.run_end, |c| c.max(up.run_end)));
            }
        }

        if let Some(finish) = completion {
            self.check_due(order, finish, &mut outcome);
        }

        info!(
            batches = batches.len(),
            operations = outcome.operations.len(),
            late = outcome.late,
            "订单排产完成"
        );
        Ok(outcome)
    }

    /// 输入缺陷检查: 无工序 / 开工时间越界 / 引用未知机床
    pub fn validate(&self, order: &Order) -> EngineResult<()> {
        if order.operations.is_empty() {
            return Err(EngineError::NoOperations {
                part_number: order.part_number.clone(),
            });
        }
        if let Some(start) = order.start_override.filter(|t| !in_planning_range(*t)) {
            return Err(EngineError::InvalidInput(format!(
                "订单 {} 开工时间超出排产范围: {}",
                order.part_number, start
            )));
        }
        if self.known_machines.is_empty() {
            return Ok(());
        }
        for op in &order.operations {
            if let Some(machine) = op
                .eligible_machines
                .iter()
                .find(|m| !self.known_machines.contains(*m))
            {
                return Err(EngineError::UnknownMachine {
                    part_number: order.part_number.clone(),
                    seq: op.seq,
                    machine: machine.clone(),
                });
            }
        }
        Ok(())
    }

    // ==========================================
    // 单个 (批次, 工序)
    // ==========================================

    /// 排产单个 (批次, 工序)
    ///
    /// 先按预估区间选机床，再按实际占用区间复核故障:
    /// 冲突时排除该机床重选；所有机床均冲突时推迟到最早的故障结束时刻
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(batch = %batch.id, seq = op.seq))]
    fn schedule_operation(
        &self,
        ledgers: &mut LedgerSet,
        calendar: &ShiftCalendar,
        order: &Order,
        batch: &Batch,
        op: &Operation,
        earliest: NaiveDateTime,
        upstream: Option<&UpstreamFlow>,
    ) -> EngineResult<ScheduledOperation> {
        let machine_selector = MachineSelector::new(self.settings, self.config);
        let mut requested = earliest;
        let mut excluded: Vec<String> = Vec::new();
        let mut resume: Option<NaiveDateTime> = None;

        for _ in 0..MAX_BREAKDOWN_RETRIES {
            // 1) 机床
            let choice = machine_selector.select(
                &ledgers.machines,
                MachineRequest {
                    operation: op,
                    batch_qty: batch.quantity,
                    requested_start: requested,
                    due: order.due,
                    order_breakdown: order.breakdown.as_ref(),
                    excluded: &excluded,
                },
            )?;

            // 2) ~ 4) 调机、操作工、加工段（不预占）
            let plan = self.plan(ledgers, calendar, &choice.machine, batch, op, requested, upstream)?;
            let occupied = Interval::new(plan.setup_start, plan.run.run.end)?;

            // 5) 按实际占用区间复核故障
            match machine_selector.downtime(&choice.machine, &occupied, order.breakdown.as_ref()) {
                None => return self.commit(ledgers, order, batch, op, choice.machine, plan),
                Some(Downtime::WholeRun)
                    if choice.rule == SelectionRule::BreakdownFallback && resume.is_none() =>
                {
                    warn!(machine = %choice.machine, "使用故障机床作为最后手段");
                    return self.commit(ledgers, order, batch, op, choice.machine, plan);
                }
                Some(downtime) => {
                    debug!(
                        machine = %choice.machine,
                        start = %occupied.start,
                        end = %occupied.end,
                        "实际占用区间与机床故障冲突，排除后重选"
                    );
                    if let Downtime::Until(end) = downtime {
                        resume = Some(resume.map_or(end, |r| r.min(end)));
                    }
                    excluded.push(choice.machine);
                }
            }

            if op.eligible_machines.iter().all(|m| excluded.contains(m)) {
                match resume.take() {
                    Some(at) => {
                        info!(resume = %at, "所有可用机床均处于故障，推迟到故障结束");
                        requested = requested.max(at);
                        excluded.clear();
                    }
                    None => break,
                }
            }
        }

        Err(EngineError::InvalidInput(format!(
            "工序 {} 的可用机床在排产区间内均处于故障",
            op.seq
        )))
    }

    /// 计算调机与加工时间（只读台账）
    #[allow(clippy::too_many_arguments)]
    fn plan(
        &self,
        ledgers: &LedgerSet,
        calendar: &ShiftCalendar,
        machine: &str,
        batch: &Batch,
        op: &Operation,
        earliest: NaiveDateTime,
        upstream: Option<&UpstreamFlow>,
    ) -> EngineResult<OperationPlan> {
        let timing = TimingCalculator::new(calendar, self.settings.production_window);
        let machine_free = ledgers.machines.earliest_free(machine);

        let (setup_start, setup_end, assignment) = if op.needs_setup() {
            let setup = op.setup_duration();
            let requested_setup = timing.setup_start(earliest, machine_free, upstream, setup);
            let operator_selector = OperatorSelector::new(calendar, self.config);
            let assignment = operator_selector.assign(&ledgers.operators, op.seq, requested_setup, setup)?;
            let assignment = operator_selector.secure(&ledgers.operators, op.seq, assignment)?;
            match (assignment.setup_start(), assignment.setup_end()) {
                (Some(start), Some(end)) => (start, end, Some(assignment)),
                _ => {
                    return Err(EngineError::InvalidInput(format!(
                        "工序 {} 操作工分配为空",
                        op.seq
                    )))
                }
            }
        } else {
            // 无调机: 不占用操作工，不受调机窗口约束
            let start = earliest.max(machine_free);
            (start, start, None)
        };

        let run = timing.run(setup_end, batch.quantity, op.cycle_duration(), upstream)?;
        Ok(OperationPlan {
            setup_start,
            setup_end,
            assignment,
            run,
        })
    }

    /// 预占资源并生成已排工序
    fn commit(
        &self,
        ledgers: &mut LedgerSet,
        order: &Order,
        batch: &Batch,
        op: &Operation,
        machine: String,
        plan: OperationPlan,
    ) -> EngineResult<ScheduledOperation> {
        ledgers
            .machines
            .reserve(&machine, Interval::new(plan.setup_start, plan.run.run.end)?)?;

        let (operator, segments, delayed, spillover, emergency) = match plan.assignment {
            Some(assignment) => {
                for segment in &assignment.segments {
                    ledgers.operators.reserve(&segment.operator, segment.interval)?;
                }
                (
                    assignment.display_operator(),
                    assignment.segments,
                    assignment.delayed,
                    assignment.spillover,
                    assignment.emergency,
                )
            }
            None => (NO_OPERATOR.to_string(), Vec::new(), false, false, false),
        };

        let setup = if plan.setup_end > plan.setup_start {
            Interval::new(plan.setup_start, plan.setup_end)?
        } else {
            Interval::at(plan.setup_start)
        };

        debug!(
            machine = %machine,
            operator = %operator,
            setup_start = %plan.setup_start,
            run_end = %plan.run.run.end,
            "工序排产完成"
        );

        Ok(ScheduledOperation {
            part_number: order.part_number.clone(),
            batch_id: batch.id.clone(),
            batch_qty: batch.quantity,
            operation_seq: op.seq,
            operation_name: op.name.clone(),
            cycle_minutes: op.cycle_minutes,
            machine,
            operator,
            operator_segments: segments,
            setup_delayed: delayed,
            spillover,
            operator_emergency: emergency,
            setup,
            run: plan.run.run,
            piece_starts: plan.run.piece_starts,
            piece_completions: plan.run.piece_completions,
            first_piece_done: plan.run.first_piece_done,
            work_minutes: plan.run.work_minutes,
            pauses: plan.run.pauses,
            due_warning: None,
        })
    }

    /// 交期检查: 延误小时数按毫秒差向上取整
    fn check_due(&self, order: &Order, finish: NaiveDateTime, outcome: &mut OrderOutcome) {
        if finish <= order.due {
            return;
        }
        let late_ms = (finish - order.due).num_milliseconds();
        let late_hours = (late_ms + MS_PER_HOUR - 1) / MS_PER_HOUR;
        let warning = format!(
            "completes {} after due {} (late by {} h)",
            format_timestamp(finish),
            format_timestamp(order.due),
            late_hours
        );

        let last_seq = order.operations.last().map(|op| op.seq);
        for scheduled in outcome
            .operations
            .iter_mut()
            .filter(|s| Some(s.operation_seq) == last_seq)
        {
            scheduled.due_warning = Some(warning.clone());
        }

        warn!(late_hours, "订单存在交期风险");
        outcome.late = true;
        outcome.alerts.push(format!(
            "DUE_DATE_RISK: part {} {}",
            order.part_number, warning
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Priority;
    use chrono::NaiveDate;

    fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn op(seq: u32, setup: f64, cycle: f64, machine: &str) -> Operation {
        Operation::new(seq, format!("OP{}", seq), setup, cycle, 1, vec![machine.to_string()]).unwrap()
    }

    struct Fixture {
        settings: GlobalSettings,
        config: EngineConfig,
        calendar: ShiftCalendar,
        machines: BTreeSet<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let settings = GlobalSettings::new(dt(5, 7, 0));
            let calendar = ShiftCalendar::from_settings(&settings).unwrap();
            Self {
                settings,
                config: EngineConfig::default(),
                calendar,
                machines: ["M1", "M2", "M3", "M4"].iter().map(|m| m.to_string()).collect(),
            }
        }

        fn scheduler(&self) -> OrderScheduler<'_> {
            OrderScheduler::new(&self.settings, &self.config, &self.calendar, &self.machines)
        }
    }

    #[test]
    fn test_piece_flow_across_operations() {
        let fx = Fixture::new();
        let mut ledgers = LedgerSet::new(fx.settings.start);
        let order = Order::new(
            "P-100",
            4,
            Priority::Normal,
            dt(10, 18, 0),
            vec![
                op(1, 70.0, 18.0, "M1"),
                op(2, 70.0, 10.0, "M2"),
                op(3, 70.0, 1.0, "M3"),
                op(4, 70.0, 1.0, "M4"),
            ],
        )
        .unwrap();

        let outcome = fx.scheduler().schedule(&mut ledgers, &order).unwrap();
        let ops = &outcome.operations;
        assert_eq!(ops.len(), 4);

        assert_eq!(ops[0].setup.start, dt(5, 7, 0));
        assert_eq!(ops[0].setup.end, dt(5, 8, 10));
        assert_eq!(ops[0].run.end, dt(5, 9, 22));
        assert_eq!(ops[0].first_piece_done, dt(5, 8, 28));

        // 下游调机由上游首件触发
        assert_eq!(ops[1].setup.start, dt(5, 8, 28));
        for pair in ops.windows(2) {
            assert!(pair[1].first_piece_done > pair[0].first_piece_done);
            assert!(pair[1].run.end >= pair[0].run.end);
        }
        assert!(outcome.alerts.is_empty());
        assert!(ledgers.verify().is_ok());
    }

    #[test]
    fn test_late_order_gets_single_alert() {
        let fx = Fixture::new();
        let mut ledgers = LedgerSet::new(fx.settings.start);
        let order = Order::new(
            "P-LATE",
            10,
            Priority::High,
            dt(5, 8, 0),
            vec![op(10, 60.0, 6.0, "M1"), op(20, 30.0, 3.0, "M2")],
        )
        .unwrap();

        let outcome = fx.scheduler().schedule(&mut ledgers, &order).unwrap();
        assert!(outcome.late);
        assert_eq!(outcome.alerts.len(), 1);
        assert!(outcome.alerts[0].contains("P-LATE"));

        let finish = outcome.operations.iter().map(|s| s.run.end).max().unwrap();
        let expected_hours = ((finish - order.due).num_milliseconds() + MS_PER_HOUR - 1) / MS_PER_HOUR;
        assert!(outcome.alerts[0].contains(&format!("late by {} h", expected_hours)));

        let warned: Vec<u32> = outcome
            .operations
            .iter()
            .filter(|s| s.due_warning.is_some())
            .map(|s| s.operation_seq)
            .collect();
        assert_eq!(warned, vec![20]);
    }

    #[test]
    fn test_input_defects() {
        let fx = Fixture::new();
        let mut ledgers = LedgerSet::new(fx.settings.start);

        let empty = Order::new("P-EMPTY", 5, Priority::Normal, dt(9, 0, 0), vec![]).unwrap();
        assert!(matches!(
            fx.scheduler().schedule(&mut ledgers, &empty),
            Err(EngineError::NoOperations { .. })
        ));

        let unknown = Order::new("P-X", 5, Priority::Normal, dt(9, 0, 0), vec![op(1, 10.0, 1.0, "M9")]).unwrap();
        assert!(matches!(
            fx.scheduler().schedule(&mut ledgers, &unknown),
            Err(EngineError::UnknownMachine { seq: 1, .. })
        ));
        assert_eq!(ledgers.machines.resources().count(), 0);
    }

    #[test]
    fn test_start_override_and_setup_window() {
        let fx = Fixture::new();
        let mut ledgers = LedgerSet::new(fx.settings.start);
        let window = crate::domain::interval::DailyWindow::from_hours(8, 20).unwrap();
        let order = Order::new("P-W", 2, Priority::Normal, dt(9, 0, 0), vec![op(1, 30.0, 5.0, "M1")])
            .unwrap()
            .with_start(dt(6, 7, 0))
            .with_setup_window(window);

        let outcome = fx.scheduler().schedule(&mut ledgers, &order).unwrap();
        assert_eq!(outcome.operations[0].setup.start, dt(6, 8, 0));
    }

    #[test]
    fn test_zero_setup_needs_no_operator() {
        let fx = Fixture::new();
        let mut ledgers = LedgerSet::new(fx.settings.start);
        let order = Order::new("P-WASH", 5, Priority::Normal, dt(9, 0, 0), vec![op(10, 0.0, 5.0, "M1")])
            .unwrap()
            .with_start(dt(5, 23, 0));

        let outcome = fx.scheduler().schedule(&mut ledgers, &order).unwrap();
        let scheduled = &outcome.operations[0];
        // 无调机不受调机窗口限制，直接开机
        assert_eq!(scheduled.setup.start, dt(5, 23, 0));
        assert!(scheduled.setup.is_empty());
        assert_eq!(scheduled.run.end, dt(5, 23, 25));
        assert_eq!(scheduled.operator, NO_OPERATOR);
        assert!(scheduled.operator_segments.is_empty());
        assert_eq!(ledgers.operators.resources().count(), 0);
        assert!(ledgers.verify().is_ok());
    }

    #[test]
    fn test_emergency_assignment_raises_alert() {
        let mut fx = Fixture::new();
        fx.config.search_horizon_days = 0;
        let mut ledgers = LedgerSet::new(fx.settings.start);
        ledgers.operators.reserve("A", Interval::new(dt(5, 6, 0), dt(5, 7, 20)).unwrap()).unwrap();
        ledgers.operators.reserve("A", Interval::new(dt(5, 12, 0), dt(5, 13, 0)).unwrap()).unwrap();
        ledgers.operators.reserve("B", Interval::new(dt(5, 6, 0), dt(5, 14, 0)).unwrap()).unwrap();

        let order = Order::new("P-EM", 2, Priority::Normal, dt(9, 0, 0), vec![op(10, 70.0, 1.0, "M1")]).unwrap();
        let outcome = fx.scheduler().schedule(&mut ledgers, &order).unwrap();
        assert!(outcome.operations[0].operator_emergency);
        assert!(outcome
            .alerts
            .iter()
            .any(|a| a.starts_with("OPERATOR_EMERGENCY: part P-EM")));
    }
}
