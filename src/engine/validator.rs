// ==========================================
// 机加工排产系统 - 排产结果校验器
// ==========================================
// 检查项:
//   1) 机床占用无重叠
//   2) 操作工占用无重叠
//   3) 操作工占用位于本人班次与调机窗口内
//   4) 单件流: 调机与上游首件的先后、加工结束单调不减、逐件先后
//   5) 同时调机数 ≤ 在岗操作工数
//   6) 机床占用不落在故障时段内（需提供故障信息）
// 自动修复: 仅修复第 4 项中的计时问题（后移加工段）
// 下游工序只记录提示，不做级联重排
// ==========================================

use crate::config::settings::GlobalSettings;
use crate::config::shift_calendar::ShiftCalendar;
use crate::domain::interval::{duration_from_minutes, Interval};
use crate::domain::order::{Breakdown, Order};
use crate::domain::schedule::{format_timestamp, ScheduledOperation};
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// 校验结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub violations: Vec<String>,
    pub fixes: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct ScheduleValidator<'a> {
    calendar: &'a ShiftCalendar,
    auto_fix: bool,
    settings: Option<&'a GlobalSettings>,
    order_breakdowns: BTreeMap<&'a str, &'a Breakdown>,
}

impl<'a> ScheduleValidator<'a> {
    pub fn new(calendar: &'a ShiftCalendar, auto_fix: bool) -> Self {
        Self {
            calendar,
            auto_fix,
            settings: None,
            order_breakdowns: BTreeMap::new(),
        }
    }

    /// 启用故障检查: 全局故障取自设置，订单级故障按零件号匹配
    pub fn with_breakdowns(mut self, settings: &'a GlobalSettings, orders: &'a [Order]) -> Self {
        self.settings = Some(settings);
        self.order_breakdowns = orders
            .iter()
            .filter_map(|o| o.breakdown.as_ref().map(|b| (o.part_number.as_str(), b)))
            .collect();
        self
    }

    pub fn validate(&self, operations: &mut [ScheduledOperation]) -> ValidationReport {
        let mut report = ValidationReport::default();

        self.check_piece_flow(operations, &mut report);
        self.check_machine_overlap(operations, &mut report);
        self.check_operator_overlap(operations, &mut report);
        self.check_shift_containment(operations, &mut report);
        self.check_setup_capacity(operations, &mut report);
        self.check_breakdowns(operations, &mut report);

        if report.is_clean() {
            info!(operations = operations.len(), "排产结果校验通过");
        } else {
            for v in &report.violations {
                warn!(violation = %v, "排产结果校验发现问题");
            }
        }
        report
    }

    // ==========================================
    // 资源重叠
    // ==========================================

    fn check_machine_overlap(&self, operations: &[ScheduledOperation], report: &mut ValidationReport) {
        let mut by_machine: BTreeMap<&str, Vec<(Interval, String)>> = BTreeMap::new();
        for op in operations {
            by_machine
                .entry(op.machine.as_str())
                .or_default()
                .push((op.machine_interval(), label(op)));
        }
        for (machine, entries) in by_machine {
            for (a, b) in overlapping_pairs(entries) {
                report
                    .violations
                    .push(format!("MACHINE_OVERLAP: {} {} overlaps {}", machine, a, b));
            }
        }
    }

    fn check_operator_overlap(&self, operations: &[ScheduledOperation], report: &mut ValidationReport) {
        let mut by_operator: BTreeMap<&str, Vec<(Interval, String)>> = BTreeMap::new();
        for op in operations {
            for segment in &op.operator_segments {
                by_operator
                    .entry(segment.operator.as_str())
                    .or_default()
                    .push((segment.interval, label(op)));
            }
        }
        for (operator, entries) in by_operator {
            for (a, b) in overlapping_pairs(entries) {
                report
                    .violations
                    .push(format!("OPERATOR_OVERLAP: {} {} overlaps {}", operator, a, b));
            }
        }
    }

    fn check_shift_containment(&self, operations: &[ScheduledOperation], report: &mut ValidationReport) {
        for op in operations {
            for segment in &op.operator_segments {
                if !self.calendar.is_allowed(&segment.operator, &segment.interval) {
                    report.violations.push(format!(
                        "SHIFT_VIOLATION: {} operator {} setup {} ~ {} outside shift",
                        label(op),
                        segment.operator,
                        format_timestamp(segment.interval.start),
                        format_timestamp(segment.interval.end)
                    ));
                }
            }
        }
    }

    /// 任一调机开始时刻，进行中的调机数不得超过在岗人数
    fn check_setup_capacity(&self, operations: &[ScheduledOperation], report: &mut ValidationReport) {
        let segments: Vec<Interval> = operations
            .iter()
            .flat_map(|op| op.operator_segments.iter().map(|s| s.interval))
            .collect();
        let mut starts: Vec<NaiveDateTime> = segments.iter().map(|iv| iv.start).collect();
        starts.sort();
        starts.dedup();

        for t in starts {
            let active = segments.iter().filter(|iv| iv.contains_instant(t)).count();
            let on_duty = self.calendar.on_duty_count(t);
            if active > on_duty {
                report.violations.push(format!(
                    "SETUP_CAPACITY: {} concurrent setups at {} with {} operators on duty",
                    active,
                    format_timestamp(t),
                    on_duty
                ));
            }
        }
    }

    fn check_breakdowns(&self, operations: &[ScheduledOperation], report: &mut ValidationReport) {
        let settings = match self.settings {
            Some(settings) => settings,
            None => return,
        };
        for op in operations {
            let occupied = op.machine_interval();
            let down = settings.is_machine_down(&op.machine, &occupied)
                || self
                    .order_breakdowns
                    .get(op.part_number.as_str())
                    .map(|b| b.affects(&op.machine, &occupied))
                    .unwrap_or(false);
            if down {
                report.violations.push(format!(
                    "BREAKDOWN: {} on {} {} ~ {} overlaps machine breakdown",
                    label(op),
                    op.machine,
                    format_timestamp(occupied.start),
                    format_timestamp(occupied.end)
                ));
            }
        }
    }

    // ==========================================
    // 单件流
    // ==========================================

    fn check_piece_flow(&self, operations: &mut [ScheduledOperation], report: &mut ValidationReport) {
        let mut chains: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
        for (idx, op) in operations.iter().enumerate() {
            chains
                .entry((op.part_number.clone(), op.batch_id.clone()))
                .or_default()
                .push(idx);
        }

        for chain in chains.values_mut() {
            chain.sort_by_key(|&idx| operations[idx].operation_seq);
            for pos in 1..chain.len() {
                let prev = Upstream::of(&operations[chain[pos - 1]]);
                let current = &mut operations[chain[pos]];
                let name = label(current);

                if current.setup.start < prev.first_piece_done && current.setup.end > prev.first_piece_done {
                    report.violations.push(format!(
                        "PIECE_FLOW: {} setup {} ~ {} straddles upstream first piece {}",
                        name,
                        format_timestamp(current.setup.start),
                        format_timestamp(current.setup.end),
                        format_timestamp(prev.first_piece_done)
                    ));
                }

                let mut delta = Duration::zero();
                if current.run.end < prev.run_end {
                    delta = prev.run_end + duration_from_minutes(current.cycle_minutes) - current.run.end;
                    report.violations.push(format!(
                        "PIECE_FLOW: {} run end {} before upstream run end {}",
                        name,
                        format_timestamp(current.run.end),
                        format_timestamp(prev.run_end)
                    ));
                }
                let lag = current
                    .piece_starts
                    .iter()
                    .zip(prev.piece_completions.iter())
                    .map(|(start, ready)| *ready - *start)
                    .max()
                    .unwrap_or_else(Duration::zero);
                if lag > Duration::zero() {
                    report.violations.push(format!(
                        "PIECE_FLOW: {} piece starts before upstream piece completes (lag {} min)",
                        name,
                        lag.num_minutes()
                    ));
                    delta = delta.max(lag);
                }

                if self.auto_fix && delta > Duration::zero() {
                    current.shift_run_end(delta);
                    report.fixes += 1;
                    warn!(
                        operation = %name,
                        delta_min = delta.num_minutes(),
                        "自动修复: 加工段整体后移"
                    );
                    for &downstream in &chain[pos + 1..] {
                        warn!(
                            operation = %label(&operations[downstream]),
                            "上游已自动修复，下游工序未重新排产，请人工复核"
                        );
                    }
                }
            }
        }
    }
}

/// 上游工序计时快照
struct Upstream {
    first_piece_done: NaiveDateTime,
    run_end: NaiveDateTime,
    piece_completions: Vec<NaiveDateTime>,
}

impl Upstream {
    fn of(op: &ScheduledOperation) -> Self {
        Self {
            first_piece_done: op.first_piece_done,
            run_end: op.run.end,
            piece_completions: op.piece_completions.clone(),
        }
    }
}

fn label(op: &ScheduledOperation) -> String {
    format!("{}/{}/op{}", op.part_number, op.batch_id, op.operation_seq)
}

fn overlapping_pairs(mut entries: Vec<(Interval, String)>) -> Vec<(String, String)> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut pairs = Vec::new();
    for i in 0..entries.len() {
        for j in i + 1..entries.len() {
            if entries[j].0.start >= entries[i].0.end {
                break;
            }
            if entries[i].0.overlaps(&entries[j].0) {
                pairs.push((entries[i].1.clone(), entries[j].1.clone()));
            }
        }
    }
    pairs
}
