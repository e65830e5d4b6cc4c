// ==========================================
// 机加工排产系统 - 机床选择引擎
// ==========================================
// 职责: 为工序在可用机床中选择一台
// 输入: 工序可用机床 − 故障机床（全部故障时回退到首台可用机床）
// 规则（顺序执行，命中即返回）:
//   1) 未使用机床，5 分钟内可开工
//   2) 未使用机床，30 分钟内可开工
//   3) 任一未使用机床（优先铺开产能）
//   4) 5 分钟内可开工且满足交期，预约数少者优先
//   5) 5 分钟内可开工，预约数少者优先
//   6) 满足交期，预约数少者优先，其次开工早者
//   7) 兜底: 累计负荷小时最少 → 预约数最少 → 开工最早
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::config::settings::GlobalSettings;
use crate::domain::interval::{checked_offset, Interval};
use crate::domain::order::{Breakdown, Downtime, Operation};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ledger::ResourceLedger;
use chrono::{Duration, NaiveDateTime};
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, instrument, warn};

/// 命中的选择规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    UnusedQuickStart,
    UnusedNearStart,
    UnusedAny,
    QuickStartMeetsDue,
    QuickStart,
    MeetsDue,
    LeastLoaded,
    BreakdownFallback,
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            SelectionRule::UnusedQuickStart => "UNUSED_QUICK_START",
            SelectionRule::UnusedNearStart => "UNUSED_NEAR_START",
            SelectionRule::UnusedAny => "UNUSED_ANY",
            SelectionRule::QuickStartMeetsDue => "QUICK_START_MEETS_DUE",
            SelectionRule::QuickStart => "QUICK_START",
            SelectionRule::MeetsDue => "MEETS_DUE",
            SelectionRule::LeastLoaded => "LEAST_LOADED",
            SelectionRule::BreakdownFallback => "BREAKDOWN_FALLBACK",
        };
        write!(f, "{}", code)
    }
}

/// 单台机床的评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct MachineCandidate {
    pub machine: String,
    pub earliest_free: NaiveDateTime,
    pub start: NaiveDateTime,         // max(期望开工, 最早空闲)
    pub estimated_end: NaiveDateTime, // 开工 + 调机 + 批量×节拍
    pub meets_due: bool,
    pub workload_hours: f64,
    pub bookings: usize,
}

impl MachineCandidate {
    fn unused(&self) -> bool {
        self.bookings == 0
    }

    fn wait(&self, requested: NaiveDateTime) -> Duration {
        self.start - requested
    }
}

/// 选择结果
#[derive(Debug, Clone, PartialEq)]
pub struct MachineChoice {
    pub machine: String,
    pub rule: SelectionRule,
    pub candidate: MachineCandidate,
}

/// 单次选择请求
#[derive(Debug, Clone, Copy)]
pub struct MachineRequest<'r> {
    pub operation: &'r Operation,
    pub batch_qty: u32,
    pub requested_start: NaiveDateTime,
    pub due: NaiveDateTime,
    pub order_breakdown: Option<&'r Breakdown>,
    pub excluded: &'r [String], // 本次不参与选择的机床（实排后与故障冲突）
}

// ==========================================
// MachineSelector - 机床选择
// ==========================================
pub struct MachineSelector<'a> {
    settings: &'a GlobalSettings,
    config: &'a EngineConfig,
}

impl<'a> MachineSelector<'a> {
    pub fn new(settings: &'a GlobalSettings, config: &'a EngineConfig) -> Self {
        Self { settings, config }
    }

    /// 选择机床
    ///
    /// # 返回
    /// - Ok(MachineChoice): 选中的机床及命中规则
    /// - Err: 工序没有任何可选机床，或预估结束时间越界
    #[instrument(skip(self, ledger, request), fields(
        seq = request.operation.seq,
        qty = request.batch_qty,
        requested = %request.requested_start
    ))]
    pub fn select(&self, ledger: &ResourceLedger, request: MachineRequest<'_>) -> EngineResult<MachineChoice> {
        let all: Vec<MachineCandidate> = request
            .operation
            .eligible_machines
            .iter()
            .filter(|m| !request.excluded.contains(*m))
            .map(|m| self.evaluate(ledger, m, &request))
            .collect::<EngineResult<_>>()?;

        let available: Vec<MachineCandidate> = all
            .iter()
            .filter(|c| !self.is_down(c, &request))
            .cloned()
            .collect();

        if available.is_empty() {
            let fallback = all.into_iter().next().ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "工序 {} 没有可用机床",
                    request.operation.seq
                ))
            })?;
            warn!(
                machine = %fallback.machine,
                "所有可用机床均处于故障，回退到首台可用机床"
            );
            return Ok(MachineChoice {
                machine: fallback.machine.clone(),
                rule: SelectionRule::BreakdownFallback,
                candidate: fallback,
            });
        }

        let (rule, chosen) = self
            .apply_rules(&available, request.requested_start)
            .ok_or_else(|| {
                EngineError::InvalidInput(format!("工序 {} 没有可用机床", request.operation.seq))
            })?;
        debug!(
            machine = %chosen.machine,
            rule = %rule,
            start = %chosen.start,
            meets_due = chosen.meets_due,
            "机床选择完成"
        );
        Ok(MachineChoice {
            machine: chosen.machine.clone(),
            rule,
            candidate: chosen.clone(),
        })
    }

    /// 评估单台机床
    pub fn evaluate(
        &self,
        ledger: &ResourceLedger,
        machine: &str,
        request: &MachineRequest<'_>,
    ) -> EngineResult<MachineCandidate> {
        let earliest_free = ledger.earliest_free(machine);
        let start = request.requested_start.max(earliest_free);
        let estimated_end = checked_offset(
            start,
            request.operation.setup_duration() + request.operation.run_duration(request.batch_qty),
        )?;
        Ok(MachineCandidate {
            machine: machine.to_string(),
            earliest_free,
            start,
            estimated_end,
            meets_due: estimated_end <= request.due,
            workload_hours: ledger.reserved_minutes(machine) / 60.0,
            bookings: ledger.booking_count(machine),
        })
    }

    /// 机床在 interval 内的故障冲突（全局故障 + 订单级故障）
    pub fn downtime(
        &self,
        machine: &str,
        interval: &Interval,
        order_breakdown: Option<&Breakdown>,
    ) -> Option<Downtime> {
        let global = self.settings.downtime(machine, interval);
        let local = order_breakdown.and_then(|b| b.downtime(machine, interval));
        match (global, local) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        }
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn is_down(&self, candidate: &MachineCandidate, request: &MachineRequest<'_>) -> bool {
        let window = Interval {
            start: candidate.start,
            end: candidate.estimated_end,
        };
        self.downtime(&candidate.machine, &window, request.order_breakdown)
            .is_some()
    }

    fn apply_rules<'c>(
        &self,
        candidates: &'c [MachineCandidate],
        requested: NaiveDateTime,
    ) -> Option<(SelectionRule, &'c MachineCandidate)> {
        let quick = Duration::minutes(self.config.quick_start_tolerance_min);
        let near = Duration::minutes(self.config.near_start_tolerance_min);

        // 1) ~ 3) 未使用机床
        let unused: Vec<&MachineCandidate> = candidates.iter().filter(|c| c.unused()).collect();
        if let Some(c) = unused
            .iter()
            .copied()
            .filter(|c| c.wait(requested) <= quick)
            .min_by_key(|c| c.start)
        {
            return Some((SelectionRule::UnusedQuickStart, c));
        }
        if let Some(c) = unused
            .iter()
            .copied()
            .filter(|c| c.wait(requested) <= near)
            .min_by_key(|c| c.start)
        {
            return Some((SelectionRule::UnusedNearStart, c));
        }
        if let Some(c) = unused.iter().copied().min_by_key(|c| c.start) {
            return Some((SelectionRule::UnusedAny, c));
        }

        // 4) 5) 立即可开工
        let quick_ones: Vec<&MachineCandidate> = candidates
            .iter()
            .filter(|c| c.wait(requested) <= quick)
            .collect();
        if let Some(c) = quick_ones
            .iter()
            .copied()
            .filter(|c| c.meets_due)
            .min_by_key(|c| c.bookings)
        {
            return Some((SelectionRule::QuickStartMeetsDue, c));
        }
        if let Some(c) = quick_ones.iter().copied().min_by_key(|c| c.bookings) {
            return Some((SelectionRule::QuickStart, c));
        }

        // 6) 满足交期
        if let Some(c) = candidates
            .iter()
            .filter(|c| c.meets_due)
            .min_by_key(|c| (c.bookings, c.start))
        {
            return Some((SelectionRule::MeetsDue, c));
        }

        // 7) 兜底: 最小负荷
        candidates
            .iter()
            .min_by(|a, b| match a.workload_hours.total_cmp(&b.workload_hours) {
                Ordering::Equal => a.bookings.cmp(&b.bookings).then(a.start.cmp(&b.start)),
                other => other,
            })
            .map(|c| (SelectionRule::LeastLoaded, c))
    }
}
