// ==========================================
// 机加工排产系统 - 操作工选择引擎
// ==========================================
// 职责: 为调机区间选择操作工
// 输入: 期望调机开始时间 + 调机时长 + 操作工台账
// 输出: OperatorAssignment（一个或两个占用片段）
// ==========================================
// 选择流程:
//   1) 班次完整覆盖区间的操作工；无人覆盖 → 尝试跨班拆分，否则推迟到下一班次开始
//   2) 覆盖且无冲突者按优先分排序，分低者胜
//   3) 无人空闲 → 按各自最早空闲时间推迟，仍在同一班次内者按 (优先分, 延迟) 排序
//   4) 当前班次无解 → 逐班次向后搜索（受搜索上限约束）
//   5) 仍无解 → 首个班次合格者应急延迟 30 分钟（记录告警）
// 冲突消解（仍有冲突时）:
//   a) 替代操作工  b) 原操作工 1-15 分钟微延迟
//   c) 替代操作工 + 1-3 分钟微延迟  d) 原操作工 10/20/30 分钟递增延迟
//   全部失败 → 资源耗尽错误
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::config::shift_calendar::{ShiftCalendar, ShiftDefinition};
use crate::domain::interval::{checked_offset, Interval};
use crate::domain::schedule::{format_timestamp, OperatorShare};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ledger::ResourceLedger;
use chrono::{Duration, NaiveDateTime};
use std::cmp::Ordering;
use tracing::{debug, instrument, warn};

// 当前班次占用的权重
const CURRENT_SHIFT_WEIGHT: f64 = 0.5;
// 轮换序号的权重
const ROTATION_WEIGHT: f64 = 10.0;

// ==========================================
// OperatorAssignment - 操作工分配结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorAssignment {
    pub segments: Vec<OperatorShare>, // 按时间顺序的占用片段
    pub delayed: bool,                // 相对期望时间有推迟
    pub spillover: bool,              // 跨班拆分
    pub emergency: bool,              // 应急延迟路径
}

impl OperatorAssignment {
    fn single(operator: &str, interval: Interval, delayed: bool) -> Self {
        Self {
            segments: vec![OperatorShare {
                operator: operator.to_string(),
                interval,
            }],
            delayed,
            spillover: false,
            emergency: false,
        }
    }

    /// 调机开始（首片段开始）
    pub fn setup_start(&self) -> Option<NaiveDateTime> {
        self.segments.first().map(|s| s.interval.start)
    }

    /// 调机结束（末片段结束）
    pub fn setup_end(&self) -> Option<NaiveDateTime> {
        self.segments.last().map(|s| s.interval.end)
    }

    /// 展示用操作工: "A" 或跨班 "A→C"
    pub fn display_operator(&self) -> String {
        let mut names: Vec<&str> = Vec::new();
        for seg in &self.segments {
            if names.last() != Some(&seg.operator.as_str()) {
                names.push(seg.operator.as_str());
            }
        }
        names.join("→")
    }
}

// ==========================================
// OperatorSelector - 操作工选择
// ==========================================
pub struct OperatorSelector<'a> {
    calendar: &'a ShiftCalendar,
    config: &'a EngineConfig,
}

impl<'a> OperatorSelector<'a> {
    pub fn new(calendar: &'a ShiftCalendar, config: &'a EngineConfig) -> Self {
        Self { calendar, config }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 为调机选择操作工
    ///
    /// # 参数
    /// - ledger: 操作工台账（只读）
    /// - seq: 工序号（仅用于错误信息）
    /// - requested_start: 期望调机开始时间
    /// - setup: 调机时长
    ///
    /// # 返回
    /// - Ok(OperatorAssignment): 所有片段均无冲突且位于班次内
    /// - Err(OperatorUnavailable): 冲突消解全部失败
    #[instrument(skip(self, ledger), fields(requested = %requested_start, setup_min = setup.num_minutes()))]
    pub fn assign(
        &self,
        ledger: &ResourceLedger,
        seq: u32,
        requested_start: NaiveDateTime,
        setup: Duration,
    ) -> EngineResult<OperatorAssignment> {
        let horizon = checked_offset(requested_start, Duration::days(self.config.search_horizon_days))?;
        let mut start = self.calendar.clamp_to_setup_window(requested_start);
        let mut delayed = start > requested_start;
        let mut first_eligible: Option<(String, Interval)> = None;

        while start <= horizon {
            let candidate = Interval::starting_at(start, setup)?;
            let eligible = self.calendar.eligible_operators(&candidate);

            // 1) 无人完整覆盖 → 跨班拆分或推迟到下一班次
            if eligible.is_empty() {
                if let Some(mut split) = self.try_spillover(ledger, &candidate) {
                    split.delayed = delayed;
                    warn!(
                        operator = %split.display_operator(),
                        setup_start = %candidate.start,
                        "调机跨越班次边界，拆分给下一班次操作工"
                    );
                    return Ok(split);
                }
                start = self.calendar.next_shift_start(start);
                delayed = true;
                continue;
            }

            if first_eligible.is_none() {
                first_eligible = Some((eligible[0].operator_id.clone(), candidate));
            }

            // 2) 无冲突者按优先分
            if let Some(best) = self.best_free(ledger, &eligible, &candidate) {
                debug!(operator = %best.operator_id, "选中空闲操作工");
                return Ok(OperatorAssignment::single(&best.operator_id, candidate, delayed));
            }

            // 3) 推迟到各自最早空闲时间
            if let Some((def, interval)) = self.best_delayed(ledger, &eligible, &candidate) {
                debug!(operator = %def.operator_id, delayed_to = %interval.start, "选中延迟后的操作工");
                return Ok(OperatorAssignment::single(&def.operator_id, interval, true));
            }

            // 4) 当前班次无解，进入下一班次
            start = self.calendar.next_shift_start(start);
            delayed = true;
        }

        // 5) 应急延迟
        let (operator, base) = match first_eligible {
            Some(found) => found,
            None => {
                return Err(self.exhausted(seq, requested_start, setup));
            }
        };
        let emergency = base.shifted(Duration::minutes(self.config.emergency_delay_min));
        warn!(
            operator = %operator,
            setup_start = %emergency.start,
            delay_min = self.config.emergency_delay_min,
            "操作工搜索超出范围，启用应急延迟"
        );

        let (operator, interval) = if self.calendar.is_allowed(&operator, &emergency)
            && !ledger.has_conflict(&operator, &emergency)
        {
            (operator, emergency)
        } else {
            self.resolve_conflict(ledger, &operator, &emergency)
                .ok_or_else(|| self.exhausted(seq, emergency.start, setup))?
        };

        let mut assignment = OperatorAssignment::single(&operator, interval, true);
        assignment.emergency = true;
        Ok(assignment)
    }

    /// 预占前复核: 任一片段仍冲突时执行冲突消解
    ///
    /// 跨班片段被消解时整体顺延，保证片段顺序不变
    pub fn secure(
        &self,
        ledger: &ResourceLedger,
        seq: u32,
        mut assignment: OperatorAssignment,
    ) -> EngineResult<OperatorAssignment> {
        let mut floor: Option<NaiveDateTime> = None;
        for segment in assignment.segments.iter_mut() {
            let needs_fix = ledger.has_conflict(&segment.operator, &segment.interval)
                || floor.map(|f| segment.interval.start < f).unwrap_or(false);
            if needs_fix {
                let base = match floor {
                    Some(f) if segment.interval.start < f => {
                        segment.interval.shifted(f - segment.interval.start)
                    }
                    _ => segment.interval,
                };
                let (operator, interval) = if ledger.has_conflict(&segment.operator, &base)
                    || !self.calendar.is_allowed(&segment.operator, &base)
                {
                    self.resolve_conflict(ledger, &segment.operator, &base)
                        .ok_or_else(|| self.exhausted(seq, base.start, base.duration()))?
                } else {
                    (segment.operator.clone(), base)
                };
                warn!(
                    from = %segment.operator,
                    to = %operator,
                    setup_start = %interval.start,
                    "操作工冲突已消解"
                );
                segment.operator = operator;
                segment.interval = interval;
                assignment.delayed = true;
            }
            floor = Some(segment.interval.end);
        }
        Ok(assignment)
    }

    /// 冲突消解（依次尝试，首个成功者返回）
    ///
    /// a) 班次合格且无冲突的替代操作工
    /// b) 原操作工 1..=15 分钟微延迟
    /// c) 替代操作工 + 1..=3 分钟微延迟
    /// d) 原操作工 10/20/30 分钟递增延迟
    pub fn resolve_conflict(
        &self,
        ledger: &ResourceLedger,
        operator: &str,
        interval: &Interval,
    ) -> Option<(String, Interval)> {
        let usable = |op: &str, iv: &Interval| {
            self.calendar.is_allowed(op, iv) && !ledger.has_conflict(op, iv)
        };

        // a) 替代操作工
        let alternates: Vec<&ShiftDefinition> = self
            .calendar
            .eligible_operators(interval)
            .into_iter()
            .filter(|d| d.operator_id != operator)
            .collect();
        if let Some(def) = self.best_free(ledger, &alternates, interval) {
            return Some((def.operator_id.clone(), *interval));
        }

        // b) 原操作工微延迟
        for minutes in 1..=self.config.micro_delay_max_min {
            let shifted = interval.shifted(Duration::minutes(minutes));
            if usable(operator, &shifted) {
                return Some((operator.to_string(), shifted));
            }
        }

        // c) 替代操作工 + 微延迟
        for def in self.calendar.roster().iter().filter(|d| d.operator_id != operator) {
            for minutes in 1..=self.config.alternate_micro_delay_max_min {
                let shifted = interval.shifted(Duration::minutes(minutes));
                if usable(&def.operator_id, &shifted) {
                    return Some((def.operator_id.clone(), shifted));
                }
            }
        }

        // d) 递增延迟
        for minutes in &self.config.escalating_delays_min {
            let shifted = interval.shifted(Duration::minutes(*minutes));
            if usable(operator, &shifted) {
                return Some((operator.to_string(), shifted));
            }
        }

        None
    }

    /// 优先分（越低越优先）
    ///
    /// 累计占用分钟 + 0.5 × 当前班次占用分钟 − 50（中班）+ 10 × 轮换序号
    pub fn priority_score(
        &self,
        ledger: &ResourceLedger,
        def: &ShiftDefinition,
        interval: &Interval,
    ) -> f64 {
        let total = ledger.reserved_minutes(&def.operator_id);
        let current_shift = self
            .calendar
            .effective_occurrence(def, interval.start.date())
            .map(|occ| ledger.reserved_minutes_within(&def.operator_id, &occ))
            .unwrap_or(0.0);
        let afternoon = if def.is_afternoon() {
            self.config.afternoon_bonus
        } else {
            0.0
        };
        total + CURRENT_SHIFT_WEIGHT * current_shift - afternoon
            + ROTATION_WEIGHT * def.rotation_index as f64
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn best_free<'d>(
        &self,
        ledger: &ResourceLedger,
        eligible: &[&'d ShiftDefinition],
        interval: &Interval,
    ) -> Option<&'d ShiftDefinition> {
        eligible
            .iter()
            .filter(|def| !ledger.has_conflict(&def.operator_id, interval))
            .map(|def| (*def, self.priority_score(ledger, def, interval)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(def, _)| def)
    }

    fn best_delayed<'d>(
        &self,
        ledger: &ResourceLedger,
        eligible: &[&'d ShiftDefinition],
        candidate: &Interval,
    ) -> Option<(&'d ShiftDefinition, Interval)> {
        eligible
            .iter()
            .filter_map(|def| {
                let start = candidate.start.max(ledger.earliest_free(&def.operator_id));
                let interval = Interval {
                    start,
                    end: start + candidate.duration(),
                };
                let fits = self.calendar.covers(def, &interval)
                    && !ledger.has_conflict(&def.operator_id, &interval);
                fits.then(|| {
                    let score = self.priority_score(ledger, def, &interval);
                    (*def, interval, score, start - candidate.start)
                })
            })
            .min_by(|a, b| match a.2.total_cmp(&b.2) {
                Ordering::Equal => a.3.cmp(&b.3),
                other => other,
            })
            .map(|(def, interval, _, _)| (def, interval))
    }

    /// 跨班拆分: 边界前归原班次操作工，剩余部分归下一班次操作工
    fn try_spillover(&self, ledger: &ResourceLedger, candidate: &Interval) -> Option<OperatorAssignment> {
        let boundary = self.calendar.boundary_after(candidate.start)?;
        let head = Interval::new(candidate.start, boundary).ok()?;
        let head_eligible = self.calendar.eligible_operators(&head);
        let head_op = self.best_free(ledger, &head_eligible, &head)?;

        let resume = self.calendar.shift_start_at_or_after(boundary);
        let tail = Interval::starting_at(resume, candidate.end - boundary).ok()?;
        let tail_eligible: Vec<&ShiftDefinition> = self
            .calendar
            .eligible_operators(&tail)
            .into_iter()
            .filter(|d| d.operator_id != head_op.operator_id)
            .collect();
        let tail_op = self.best_free(ledger, &tail_eligible, &tail)?;

        Some(OperatorAssignment {
            segments: vec![
                OperatorShare {
                    operator: head_op.operator_id.clone(),
                    interval: head,
                },
                OperatorShare {
                    operator: tail_op.operator_id.clone(),
                    interval: tail,
                },
            ],
            delayed: false,
            spillover: true,
            emergency: false,
        })
    }

    fn exhausted(&self, seq: u32, start: NaiveDateTime, setup: Duration) -> EngineError {
        EngineError::OperatorUnavailable {
            seq,
            start: format_timestamp(start),
            end: format_timestamp(checked_offset(start, setup).unwrap_or(start)),
        }
    }
}
