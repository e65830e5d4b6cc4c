// ==========================================
// 机加工排产系统 - 资源占用台账
// ==========================================
// 职责: 每台机床/每名操作工一条按开始时间排序的占用区间序列
// 红线: 同一资源的区间绝不重叠；发现重叠即为致命完整性错误
// 生命周期: 一次排产运行一份，运行结束即丢弃
// ==========================================

use crate::domain::interval::{duration_to_minutes, Interval};
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Machine,
    Operator,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Machine => write!(f, "machine"),
            ResourceKind::Operator => write!(f, "operator"),
        }
    }
}

// ==========================================
// ResourceLedger - 单类资源台账
// ==========================================
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    kind: ResourceKind,
    effective_start: NaiveDateTime,
    bookings: BTreeMap<String, Vec<Interval>>,
}

impl ResourceLedger {
    /// 创建空台账
    ///
    /// # 参数
    /// - kind: 资源类别（仅用于错误信息）
    /// - effective_start: 排产有效起点（无占用时的最早空闲时间）
    pub fn new(kind: ResourceKind, effective_start: NaiveDateTime) -> Self {
        Self {
            kind,
            effective_start,
            bookings: BTreeMap::new(),
        }
    }

    /// 预占区间
    ///
    /// 追加后按开始时间重排，并对该资源全部区间重新校验。
    /// 发现重叠 → 回滚本次追加并返回 IntegrityViolation。
    pub fn reserve(&mut self, resource: &str, interval: Interval) -> EngineResult<()> {
        let entries = self.bookings.entry(resource.to_string()).or_default();
        entries.push(interval);
        entries.sort();

        if let Some((first, second)) = find_overlap(entries) {
            if let Some(pos) = entries.iter().position(|iv| *iv == interval) {
                entries.remove(pos);
            }
            error!(
                kind = %self.kind,
                resource,
                first = ?first,
                second = ?second,
                "排产完整性被破坏: 资源占用重叠"
            );
            return Err(EngineError::IntegrityViolation {
                resource: format!("{}:{}", self.kind, resource),
                first,
                second,
            });
        }
        Ok(())
    }

    /// 最早空闲时间: 无占用返回有效起点，否则返回所有区间的最大结束时间
    pub fn earliest_free(&self, resource: &str) -> NaiveDateTime {
        self.bookings
            .get(resource)
            .and_then(|entries| entries.iter().map(|iv| iv.end).max())
            .unwrap_or(self.effective_start)
    }

    /// 候选区间是否与已有占用冲突（半开区间重叠）
    pub fn has_conflict(&self, resource: &str, candidate: &Interval) -> bool {
        self.bookings
            .get(resource)
            .map(|entries| entries.iter().any(|iv| iv.overlaps(candidate)))
            .unwrap_or(false)
    }

    pub fn bookings(&self, resource: &str) -> &[Interval] {
        self.bookings
            .get(resource)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn booking_count(&self, resource: &str) -> usize {
        self.bookings(resource).len()
    }

    pub fn is_unused(&self, resource: &str) -> bool {
        self.booking_count(resource) == 0
    }

    /// 已占用总分钟数
    pub fn reserved_minutes(&self, resource: &str) -> f64 {
        self.bookings(resource)
            .iter()
            .map(|iv| iv.minutes())
            .sum()
    }

    /// 与窗口重叠的已占用分钟数
    pub fn reserved_minutes_within(&self, resource: &str, window: &Interval) -> f64 {
        self.bookings(resource)
            .iter()
            .map(|iv| duration_to_minutes(iv.overlap_with(window)))
            .sum()
    }

    pub fn resources(&self) -> impl Iterator<Item = (&String, &Vec<Interval>)> {
        self.bookings.iter()
    }

    /// 全量完整性自检
    pub fn verify(&self) -> EngineResult<()> {
        for (resource, entries) in &self.bookings {
            if let Some((first, second)) = find_overlap(entries) {
                return Err(EngineError::IntegrityViolation {
                    resource: format!("{}:{}", self.kind, resource),
                    first,
                    second,
                });
            }
        }
        Ok(())
    }
}

/// 已按开始时间排序的区间序列中查找首个重叠对
fn find_overlap(sorted: &[Interval]) -> Option<(Interval, Interval)> {
    sorted
        .windows(2)
        .find(|w| w[0].overlaps(&w[1]))
        .map(|w| (w[0], w[1]))
}

// ==========================================
// LedgerSet - 机床台账 + 操作工台账
// ==========================================
#[derive(Debug, Clone)]
pub struct LedgerSet {
    pub machines: ResourceLedger,
    pub operators: ResourceLedger,
}

impl LedgerSet {
    pub fn new(effective_start: NaiveDateTime) -> Self {
        Self {
            machines: ResourceLedger::new(ResourceKind::Machine, effective_start),
            operators: ResourceLedger::new(ResourceKind::Operator, effective_start),
        }
    }

    pub fn verify(&self) -> EngineResult<()> {
        self.machines.verify()?;
        self.operators.verify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn iv(h1: u32, m1: u32, h2: u32, m2: u32) -> Interval {
        Interval::new(dt(h1, m1), dt(h2, m2)).unwrap()
    }

    #[test]
    fn test_earliest_free_defaults_to_effective_start() {
        let ledger = ResourceLedger::new(ResourceKind::Machine, dt(6, 0));
        assert_eq!(ledger.earliest_free("M1"), dt(6, 0));
        assert!(ledger.is_unused("M1"));
    }

    #[test]
    fn test_earliest_free_is_max_end() {
        let mut ledger = ResourceLedger::new(ResourceKind::Machine, dt(6, 0));
        ledger.reserve("M1", iv(10, 0, 11, 0)).unwrap();
        ledger.reserve("M1", iv(7, 0, 8, 0)).unwrap();
        assert_eq!(ledger.earliest_free("M1"), dt(11, 0));
        assert_eq!(ledger.bookings("M1")[0], iv(7, 0, 8, 0));
        assert_eq!(ledger.booking_count("M1"), 2);
        assert_eq!(ledger.reserved_minutes("M1"), 120.0);
    }

    #[test]
    fn test_conflict_is_half_open() {
        let mut ledger = ResourceLedger::new(ResourceKind::Operator, dt(6, 0));
        ledger.reserve("A", iv(8, 0, 9, 0)).unwrap();
        assert!(!ledger.has_conflict("A", &iv(9, 0, 10, 0)));
        assert!(!ledger.has_conflict("A", &iv(7, 0, 8, 0)));
        assert!(ledger.has_conflict("A", &iv(8, 59, 9, 30)));
        assert!(!ledger.has_conflict("B", &iv(8, 0, 9, 0)));
    }

    #[test]
    fn test_overlapping_reserve_is_integrity_violation() {
        let mut ledger = ResourceLedger::new(ResourceKind::Machine, dt(6, 0));
        ledger.reserve("M1", iv(8, 0, 9, 0)).unwrap();
        let err = ledger.reserve("M1", iv(8, 30, 9, 30)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, EngineError::IntegrityViolation { .. }));
        // 回滚后台账仍然一致
        assert_eq!(ledger.booking_count("M1"), 1);
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_reserved_minutes_within_window() {
        let mut ledger = ResourceLedger::new(ResourceKind::Operator, dt(6, 0));
        ledger.reserve("A", iv(7, 0, 8, 0)).unwrap();
        ledger.reserve("A", iv(13, 30, 14, 30)).unwrap();
        let morning = iv(6, 0, 14, 0);
        assert_eq!(ledger.reserved_minutes_within("A", &morning), 90.0);
    }
}
