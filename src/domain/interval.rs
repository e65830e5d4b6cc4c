// ==========================================
// 机加工排产系统 - 时间区间 / 日内窗口
// ==========================================
// 约定: 所有时间均为工厂本地时间 (NaiveDateTime)
// 区间为半开区间 [start, end)
// ==========================================

use crate::domain::error::{DomainError, DomainResult};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// 分钟数（允许小数）转换为 chrono::Duration，精度到毫秒
pub fn duration_from_minutes(minutes: f64) -> Duration {
    Duration::milliseconds((minutes * 60_000.0).round() as i64)
}

/// Duration 转换为分钟（小数）
pub fn duration_to_minutes(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 60_000.0
}

// 排产时间允许的年份范围
pub const MIN_PLANNING_YEAR: i32 = 1900;
pub const MAX_PLANNING_YEAR: i32 = 9999;

/// 时刻是否落在排产年份范围内
pub fn in_planning_range(t: NaiveDateTime) -> bool {
    (MIN_PLANNING_YEAR..=MAX_PLANNING_YEAR).contains(&t.year())
}

/// t + d，越界时返回错误而不是 panic
pub fn checked_offset(t: NaiveDateTime, d: Duration) -> DomainResult<NaiveDateTime> {
    t.checked_add_signed(d).ok_or(DomainError::TimeOverflow {
        base: t,
        minutes: d.num_minutes(),
    })
}

// ==========================================
// Interval - 时间区间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    /// 构造区间，要求 start < end
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> DomainResult<Self> {
        if start >= end {
            return Err(DomainError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// 从起点 + 时长构造
    pub fn starting_at(start: NaiveDateTime, length: Duration) -> DomainResult<Self> {
        Self::new(start, checked_offset(start, length)?)
    }

    /// 零长度区间 [t, t)，仅用于无调机工序的调机段
    pub fn at(t: NaiveDateTime) -> Self {
        Self { start: t, end: t }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn minutes(&self) -> f64 {
        duration_to_minutes(self.duration())
    }

    /// 半开区间重叠判定: a.start < b.end && b.start < a.end
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// other 是否完全落在本区间内
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_instant(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }

    /// 与 other 的重叠时长（不重叠为 0）
    pub fn overlap_with(&self, other: &Interval) -> Duration {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            end - start
        } else {
            Duration::zero()
        }
    }

    /// 整体平移
    pub fn shifted(&self, delta: Duration) -> Self {
        Self {
            start: self.start + delta,
            end: self.end + delta,
        }
    }

    /// 整天区间 [date 00:00, date+1 00:00)
    pub fn whole_day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        Self {
            start,
            end: start + Duration::days(1),
        }
    }
}

// ==========================================
// DailyWindow - 日内时间窗口 (如 06:00-22:00)
// ==========================================
// 不支持跨零点窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DailyWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> DomainResult<Self> {
        if start >= end {
            return Err(DomainError::InvalidWindow(format!(
                "{}-{}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }

    /// 按整点构造（小时需在 0..=23 内）
    pub fn from_hours(start_hour: u32, end_hour: u32) -> DomainResult<Self> {
        let start = NaiveTime::from_hms_opt(start_hour, 0, 0)
            .ok_or_else(|| DomainError::InvalidWindow(format!("{}:00", start_hour)))?;
        let end = NaiveTime::from_hms_opt(end_hour, 0, 0)
            .ok_or_else(|| DomainError::InvalidWindow(format!("{}:00", end_hour)))?;
        Self::new(start, end)
    }

    /// 某日的窗口区间
    pub fn on(&self, date: NaiveDate) -> Interval {
        Interval {
            start: date.and_time(self.start),
            end: date.and_time(self.end),
        }
    }

    pub fn is_open(&self, t: NaiveDateTime) -> bool {
        self.on(t.date()).contains_instant(t)
    }

    /// t 之后（含 t）最近的开窗时刻
    pub fn next_open(&self, t: NaiveDateTime) -> NaiveDateTime {
        let today = self.on(t.date());
        if t < today.start {
            today.start
        } else if t < today.end {
            t
        } else {
            today.start + Duration::days(1)
        }
    }
}

impl Default for DailyWindow {
    fn default() -> Self {
        // 06:00-22:00 为合法常量
        Self {
            start: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

// ==========================================
// ProductionWindow - 生产（无人值守运行）窗口
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionWindow {
    AlwaysOpen,          // 24x7
    Daily(DailyWindow),  // 每日固定时段
}

impl Default for ProductionWindow {
    fn default() -> Self {
        ProductionWindow::AlwaysOpen
    }
}
