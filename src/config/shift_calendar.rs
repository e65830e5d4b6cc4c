// ==========================================
// 机加工排产系统 - 班次/窗口日历
// ==========================================
// 职责: 回答两类静态问题
//   1) 操作工 X 能否在区间 [a,b) 内工作？
//   2) 时刻 t 是否落在调机窗口内？
// 默认: 两班各 8 小时，每班两名操作工，覆盖 06:00-22:00 调机窗口
// 约束: 班次不跨零点
// ==========================================

use crate::config::settings::GlobalSettings;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::interval::{DailyWindow, Interval};
use crate::domain::types::ShiftLabel;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// 节假日/窗口跳转的最大迭代次数
const MAX_CALENDAR_STEPS: usize = 2_000;

// ==========================================
// ShiftDefinition - 操作工班次
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftDefinition {
    pub operator_id: String,   // 操作工
    pub start_hour: u32,       // 班次开始（整点）
    pub end_hour: u32,         // 班次结束（整点）
    pub label: ShiftLabel,     // 班次标签
    pub rotation_index: usize, // 轮换序号（A=0, B=1, C=2, D=3）
}

impl ShiftDefinition {
    pub fn new(
        operator_id: impl Into<String>,
        start_hour: u32,
        end_hour: u32,
        label: ShiftLabel,
        rotation_index: usize,
    ) -> DomainResult<Self> {
        let operator_id = operator_id.into();
        if start_hour >= end_hour || end_hour > 23 {
            return Err(DomainError::InvalidWindow(format!(
                "operator {} shift {}-{}",
                operator_id, start_hour, end_hour
            )));
        }
        Ok(Self {
            operator_id,
            start_hour,
            end_hour,
            label,
            rotation_index,
        })
    }

    /// 默认班次: A/B 早班 06-14, C/D 中班 14-22
    pub fn default_roster() -> Vec<Self> {
        let make = |id: &str, start_hour, end_hour, label, rotation_index| Self {
            operator_id: id.to_string(),
            start_hour,
            end_hour,
            label,
            rotation_index,
        };
        vec![
            make("A", 6, 14, ShiftLabel::Morning, 0),
            make("B", 6, 14, ShiftLabel::Morning, 1),
            make("C", 14, 22, ShiftLabel::Afternoon, 2),
            make("D", 14, 22, ShiftLabel::Afternoon, 3),
        ]
    }

    /// 班次在某日的原始时段
    pub fn occurrence_on(&self, date: NaiveDate) -> Interval {
        let at = |hour: u32| {
            date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
        };
        Interval {
            start: at(self.start_hour),
            end: at(self.end_hour),
        }
    }

    pub fn is_afternoon(&self) -> bool {
        self.label == ShiftLabel::Afternoon
    }
}

// ==========================================
// ShiftCalendar - 班次日历
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftCalendar {
    roster: Vec<ShiftDefinition>,
    setup_window: DailyWindow,
    holidays: Vec<Interval>,
}

impl ShiftCalendar {
    /// 构造日历
    ///
    /// # 校验
    /// - 班次表非空，操作工 ID 不重复
    /// - 至少一个班次与调机窗口有交集
    pub fn new(
        roster: Vec<ShiftDefinition>,
        setup_window: DailyWindow,
        holidays: Vec<Interval>,
    ) -> DomainResult<Self> {
        if roster.is_empty() {
            return Err(DomainError::InvalidWindow("operator roster is empty".to_string()));
        }
        for (i, def) in roster.iter().enumerate() {
            if roster[..i].iter().any(|d| d.operator_id == def.operator_id) {
                return Err(DomainError::InvalidWindow(format!(
                    "duplicate operator {}",
                    def.operator_id
                )));
            }
        }

        let calendar = Self {
            roster,
            setup_window,
            holidays,
        };
        let probe = NaiveDate::from_ymd_opt(2000, 1, 3).unwrap_or(NaiveDate::MIN);
        if calendar
            .roster
            .iter()
            .all(|def| calendar.effective_occurrence(def, probe).is_none())
        {
            return Err(DomainError::InvalidWindow(
                "no shift intersects the setup window".to_string(),
            ));
        }
        Ok(calendar)
    }

    pub fn from_settings(settings: &GlobalSettings) -> DomainResult<Self> {
        Self::new(
            settings.roster.clone(),
            settings.setup_window,
            settings.holidays.clone(),
        )
    }

    /// 替换调机窗口（订单级覆写）
    pub fn with_setup_window(&self, window: DailyWindow) -> DomainResult<Self> {
        Self::new(self.roster.clone(), window, self.holidays.clone())
    }

    pub fn roster(&self) -> &[ShiftDefinition] {
        &self.roster
    }

    pub fn setup_window(&self) -> DailyWindow {
        self.setup_window
    }

    pub fn shift_of(&self, operator: &str) -> Option<&ShiftDefinition> {
        self.roster.iter().find(|d| d.operator_id == operator)
    }

    // ==========================================
    // 班次时段
    // ==========================================

    /// 班次在某日的有效时段 = 班次时段 ∩ 调机窗口
    pub fn effective_occurrence(&self, def: &ShiftDefinition, date: NaiveDate) -> Option<Interval> {
        let shift = def.occurrence_on(date);
        let window = self.setup_window.on(date);
        Interval::new(shift.start.max(window.start), shift.end.min(window.end)).ok()
    }

    /// 包含时刻 t 的有效班次时段
    pub fn occurrence_at(&self, def: &ShiftDefinition, t: NaiveDateTime) -> Option<Interval> {
        self.effective_occurrence(def, t.date())
            .filter(|occ| occ.contains_instant(t))
    }

    pub fn holiday_containing(&self, t: NaiveDateTime) -> Option<&Interval> {
        self.holidays.iter().find(|h| h.contains_instant(t))
    }

    pub fn overlaps_holiday(&self, interval: &Interval) -> bool {
        self.holidays.iter().any(|h| h.overlaps(interval))
    }

    /// 班次是否完整覆盖区间（同一班次内、调机窗口内、不碰节假日）
    pub fn covers(&self, def: &ShiftDefinition, interval: &Interval) -> bool {
        self.effective_occurrence(def, interval.start.date())
            .map(|occ| occ.contains(interval))
            .unwrap_or(false)
            && !self.overlaps_holiday(interval)
    }

    /// 操作工能否在该区间工作
    pub fn is_allowed(&self, operator: &str, interval: &Interval) -> bool {
        self.shift_of(operator)
            .map(|def| self.covers(def, interval))
            .unwrap_or(false)
    }

    /// 班次完整覆盖区间的操作工（保持班次表顺序）
    pub fn eligible_operators(&self, interval: &Interval) -> Vec<&ShiftDefinition> {
        self.roster
            .iter()
            .filter(|def| self.covers(def, interval))
            .collect()
    }

    /// 时刻 t 在岗的操作工数量
    pub fn on_duty_count(&self, t: NaiveDateTime) -> usize {
        if self.holiday_containing(t).is_some() {
            return 0;
        }
        self.roster
            .iter()
            .filter(|def| self.occurrence_at(def, t).is_some())
            .count()
    }

    /// 区间起点所在班次的最早结束边界（用于跨班拆分）
    pub fn boundary_after(&self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        self.roster
            .iter()
            .filter_map(|def| self.occurrence_at(def, t))
            .map(|occ| occ.end)
            .min()
    }

    // ==========================================
    // 窗口判定与时间推移
    // ==========================================

    /// 将时刻推入调机窗口（窗口前 → 当日开窗；窗口后 → 次日开窗；节假日 → 节假日结束）
    pub fn clamp_to_setup_window(&self, t: NaiveDateTime) -> NaiveDateTime {
        let mut cursor = t;
        for _ in 0..MAX_CALENDAR_STEPS {
            if let Some(h) = self.holiday_containing(cursor) {
                cursor = h.end;
                continue;
            }
            let next = self.setup_window.next_open(cursor);
            if next == cursor {
                return cursor;
            }
            cursor = next;
        }
        cursor
    }

    /// 严格晚于 after 的下一个班次开始时刻（跳过节假日）
    pub fn next_shift_start(&self, after: NaiveDateTime) -> NaiveDateTime {
        let mut cursor = after;
        for _ in 0..MAX_CALENDAR_STEPS {
            let next = match self.next_occurrence_start(cursor) {
                Some(t) => t,
                None => return cursor + Duration::days(1),
            };
            match self.holiday_containing(next) {
                Some(h) => {
                    let resume = h.end;
                    if self.on_duty_count(resume) > 0 && resume > after {
                        return resume;
                    }
                    cursor = resume.max(next);
                }
                None => return next,
            }
        }
        cursor
    }

    /// 不早于 t 的班次开始时刻
    pub fn shift_start_at_or_after(&self, t: NaiveDateTime) -> NaiveDateTime {
        let starts_here = self.roster.iter().any(|def| {
            self.effective_occurrence(def, t.date())
                .map(|occ| occ.start == t)
                .unwrap_or(false)
        });
        if starts_here && self.holiday_containing(t).is_none() {
            t
        } else {
            self.next_shift_start(t)
        }
    }

    fn next_occurrence_start(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        (0..=2)
            .map(|offset| after.date() + Duration::days(offset))
            .flat_map(|date| {
                self.roster
                    .iter()
                    .filter_map(move |def| self.effective_occurrence(def, date))
            })
            .map(|occ| occ.start)
            .filter(|start| *start > after)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn calendar() -> ShiftCalendar {
        ShiftCalendar::new(ShiftDefinition::default_roster(), DailyWindow::default(), vec![]).unwrap()
    }

    #[test]
    fn test_eligible_operators_by_shift() {
        let cal = calendar();
        let morning = Interval::new(dt(5, 7, 0), dt(5, 8, 10)).unwrap();
        let ids: Vec<&str> = cal
            .eligible_operators(&morning)
            .iter()
            .map(|d| d.operator_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);

        let afternoon = Interval::new(dt(5, 14, 0), dt(5, 15, 0)).unwrap();
        let ids: Vec<&str> = cal
            .eligible_operators(&afternoon)
            .iter()
            .map(|d| d.operator_id.as_str())
            .collect();
        assert_eq!(ids, vec!["C", "D"]);

        // 跨班区间无人可用
        let spanning = Interval::new(dt(5, 13, 30), dt(5, 14, 30)).unwrap();
        assert!(cal.eligible_operators(&spanning).is_empty());
        assert_eq!(cal.boundary_after(spanning.start), Some(dt(5, 14, 0)));
    }

    #[test]
    fn test_next_shift_start() {
        let cal = calendar();
        assert_eq!(cal.next_shift_start(dt(5, 7, 0)), dt(5, 14, 0));
        assert_eq!(cal.next_shift_start(dt(5, 14, 0)), dt(6, 6, 0));
        assert_eq!(cal.next_shift_start(dt(5, 23, 0)), dt(6, 6, 0));
        assert_eq!(cal.shift_start_at_or_after(dt(5, 14, 0)), dt(5, 14, 0));
        assert_eq!(cal.shift_start_at_or_after(dt(5, 22, 0)), dt(6, 6, 0));
    }

    #[test]
    fn test_clamp_to_setup_window() {
        let cal = calendar();
        assert_eq!(cal.clamp_to_setup_window(dt(5, 3, 0)), dt(5, 6, 0));
        assert_eq!(cal.clamp_to_setup_window(dt(5, 12, 0)), dt(5, 12, 0));
        assert_eq!(cal.clamp_to_setup_window(dt(5, 22, 30)), dt(6, 6, 0));
    }

    #[test]
    fn test_holiday_skips_whole_day() {
        let holiday = Interval::whole_day(NaiveDate::from_ymd_opt(2025, 9, 6).unwrap());
        let cal = ShiftCalendar::new(
            ShiftDefinition::default_roster(),
            DailyWindow::default(),
            vec![holiday],
        )
        .unwrap();
        assert_eq!(cal.clamp_to_setup_window(dt(5, 23, 0)), dt(7, 6, 0));
        assert_eq!(cal.next_shift_start(dt(5, 15, 0)), dt(7, 6, 0));
        assert!(!cal.is_allowed("A", &Interval::new(dt(6, 7, 0), dt(6, 8, 0)).unwrap()));
        assert_eq!(cal.on_duty_count(dt(6, 7, 0)), 0);
        assert_eq!(cal.on_duty_count(dt(7, 7, 0)), 2);
    }

    #[test]
    fn test_narrow_setup_window_trims_shifts() {
        let window = DailyWindow::from_hours(8, 20).unwrap();
        let cal = ShiftCalendar::new(ShiftDefinition::default_roster(), window, vec![]).unwrap();
        assert!(!cal.is_allowed("A", &Interval::new(dt(5, 7, 0), dt(5, 8, 0)).unwrap()));
        assert!(cal.is_allowed("A", &Interval::new(dt(5, 8, 0), dt(5, 9, 0)).unwrap()));
        assert_eq!(cal.next_shift_start(dt(5, 14, 0)), dt(6, 8, 0));
    }

    #[test]
    fn test_rejects_empty_or_duplicate_roster() {
        assert!(ShiftCalendar::new(vec![], DailyWindow::default(), vec![]).is_err());
        let mut roster = ShiftDefinition::default_roster();
        roster.push(roster[0].clone());
        assert!(ShiftCalendar::new(roster, DailyWindow::default(), vec![]).is_err());
    }
}
