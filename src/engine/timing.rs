// ==========================================
// 机加工排产系统 - 工序计时（单件流）
// ==========================================
// 职责: 计算单个 (批次, 工序) 的调机/加工时间
// 单件流: 下游工序第 i 件在上游第 i 件完工后才能开始
// 红线:
//   - 同一机床逐件串行加工
//   - 加工结束时间沿工序序列单调不减
// ==========================================

use crate::config::shift_calendar::ShiftCalendar;
use crate::domain::interval::{checked_offset, duration_to_minutes, Interval, ProductionWindow};
use crate::domain::schedule::ProductionPause;
use crate::engine::error::{EngineError, EngineResult};
use chrono::{Duration, NaiveDateTime};
use tracing::debug;

// 生产窗口跳转的最大迭代次数
const MAX_WINDOW_STEPS: usize = 10_000;

/// 上游工序（同批次前一工序）的单件流信息
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamFlow {
    pub piece_completions: Vec<NaiveDateTime>,
    pub first_piece_done: NaiveDateTime,
    pub run_end: NaiveDateTime,
}

/// 加工段计时结果
#[derive(Debug, Clone, PartialEq)]
pub struct RunTiming {
    pub run: Interval,
    pub piece_starts: Vec<NaiveDateTime>,
    pub piece_completions: Vec<NaiveDateTime>,
    pub first_piece_done: NaiveDateTime,
    pub work_minutes: f64,
    pub pauses: Vec<ProductionPause>,
}

/// 逐件模拟结果
struct PieceFlow {
    starts: Vec<NaiveDateTime>,
    completions: Vec<NaiveDateTime>,
    pauses: Vec<ProductionPause>,
}

// ==========================================
// TimingCalculator
// ==========================================
pub struct TimingCalculator<'a> {
    calendar: &'a ShiftCalendar,
    production_window: ProductionWindow,
}

impl<'a> TimingCalculator<'a> {
    pub fn new(calendar: &'a ShiftCalendar, production_window: ProductionWindow) -> Self {
        Self {
            calendar,
            production_window,
        }
    }

    /// 调机开始时间
    ///
    /// base = max(最早允许开工, 机床最早空闲)；
    /// 若调机无法在上游首件完工前结束，则等到上游首件完工；
    /// 否则允许与上游并行调机。结果推入调机窗口。
    pub fn setup_start(
        &self,
        earliest: NaiveDateTime,
        machine_free: NaiveDateTime,
        upstream: Option<&UpstreamFlow>,
        setup: Duration,
    ) -> NaiveDateTime {
        let base = earliest.max(machine_free);
        let start = match upstream {
            Some(up) if base + setup > up.first_piece_done => base.max(up.first_piece_done),
            _ => base,
        };
        self.calendar.clamp_to_setup_window(start)
    }

    /// 加工段计时
    ///
    /// # 参数
    /// - setup_end: 调机结束（加工开始）
    /// - qty: 批量
    /// - cycle: 单件节拍
    /// - upstream: 同批次上游工序（首道工序为 None）
    pub fn run(
        &self,
        setup_end: NaiveDateTime,
        qty: u32,
        cycle: Duration,
        upstream: Option<&UpstreamFlow>,
    ) -> EngineResult<RunTiming> {
        if qty == 0 || cycle <= Duration::zero() {
            return Err(EngineError::InvalidInput(format!(
                "批量 {} / 节拍 {} 分钟无法计时",
                qty,
                cycle.num_minutes()
            )));
        }

        let ready: Vec<NaiveDateTime> = (0..qty as usize)
            .map(|i| {
                upstream
                    .and_then(|up| up.piece_completions.get(i).copied())
                    .unwrap_or(setup_end)
            })
            .collect();
        let mut flow = self.simulate(setup_end, cycle, &ready)?;

        // 单调不减: 本工序结束不得早于上游结束
        // 整体后移后按生产窗口重新逐件计时
        let last_start = flow.starts.last().copied();
        let natural_end = flow.completions.last().copied();
        if let (Some(up), Some(last_start), Some(natural_end)) = (upstream, last_start, natural_end) {
            if up.run_end > natural_end {
                let delta = up.run_end - last_start;
                debug!(
                    delta_min = delta.num_minutes(),
                    "加工结束早于上游，整体后移"
                );
                let shifted = flow
                    .starts
                    .iter()
                    .map(|t| checked_offset(*t, delta))
                    .collect::<Result<Vec<_>, _>>()?;
                flow = self.simulate(setup_end, cycle, &shifted)?;
            }
        }

        let (first_piece_done, run_end) = match (flow.completions.first(), flow.completions.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(EngineError::InvalidInput("加工段没有任何件".to_string())),
        };

        Ok(RunTiming {
            run: Interval::new(setup_end, run_end)?,
            piece_starts: flow.starts,
            piece_completions: flow.completions,
            first_piece_done,
            work_minutes: duration_to_minutes(cycle) * qty as f64,
            pauses: flow.pauses,
        })
    }

    /// 逐件串行: 第 i 件不早于 ready[i] 与前一件完工
    fn simulate(
        &self,
        setup_end: NaiveDateTime,
        cycle: Duration,
        ready: &[NaiveDateTime],
    ) -> EngineResult<PieceFlow> {
        let mut flow = PieceFlow {
            starts: Vec::with_capacity(ready.len()),
            completions: Vec::with_capacity(ready.len()),
            pauses: Vec::new(),
        };
        let mut machine_available = setup_end;
        for &at in ready {
            let start = self.open_at_or_after(at.max(machine_available), &mut flow.pauses);
            let done = self.advance(start, cycle, &mut flow.pauses)?;
            flow.starts.push(start);
            flow.completions.push(done);
            machine_available = done;
        }
        Ok(flow)
    }

    // ==========================================
    // 生产窗口
    // ==========================================

    /// 推到生产窗口内；窗口关闭期间记为暂停
    fn open_at_or_after(&self, t: NaiveDateTime, pauses: &mut Vec<ProductionPause>) -> NaiveDateTime {
        match self.production_window {
            ProductionWindow::AlwaysOpen => t,
            ProductionWindow::Daily(window) => {
                let open = window.next_open(t);
                if open > t {
                    pauses.push(ProductionPause {
                        paused_at: t,
                        resumed_at: open,
                    });
                }
                open
            }
        }
    }

    /// 从 start 起累计 work 的有效加工时间；跨越关窗时暂停到下一次开窗
    fn advance(
        &self,
        start: NaiveDateTime,
        work: Duration,
        pauses: &mut Vec<ProductionPause>,
    ) -> EngineResult<NaiveDateTime> {
        let window = match self.production_window {
            ProductionWindow::AlwaysOpen => return Ok(checked_offset(start, work)?),
            ProductionWindow::Daily(window) => window,
        };

        let mut cursor = start;
        let mut remaining = work;
        for _ in 0..MAX_WINDOW_STEPS {
            cursor = self.open_at_or_after(cursor, pauses);
            let close = window.on(cursor.date()).end;
            let end = checked_offset(cursor, remaining)?;
            if end <= close {
                return Ok(end);
            }
            remaining -= close - cursor;
            cursor = close;
        }
        Ok(checked_offset(cursor, remaining)?)
    }
}
