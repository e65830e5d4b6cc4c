// ==========================================
// 机加工排产系统 - 全局排产设置
// ==========================================
// 来源: 外部 JSON 设置经 importer 解析为强类型
// 职责: 开工时间、节假日、故障机床、调机/生产窗口、工序覆写
// ==========================================

use crate::config::shift_calendar::ShiftDefinition;
use crate::domain::interval::{DailyWindow, Interval, ProductionWindow};
use crate::domain::order::Downtime;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// OperationOverride - 工序参数覆写（按工序名称）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationOverride {
    pub setup_minutes: Option<f64>,
    pub cycle_minutes: Option<f64>,
    pub eligible_machines: Option<Vec<String>>,
}

// ==========================================
// GlobalSettings - 全局设置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub start: NaiveDateTime,                        // 排产起点
    pub holidays: Vec<Interval>,                     // 节假日
    pub breakdowns: BTreeMap<String, Vec<Interval>>, // 故障机床 → 故障时段（空列表=全程故障）
    pub setup_window: DailyWindow,                   // 调机窗口（默认 06:00-22:00）
    pub production_window: ProductionWindow,         // 生产窗口（默认 24x7）
    pub machines: Vec<String>,                       // 已知机床（空=由订单推导）
    pub roster: Vec<ShiftDefinition>,                // 操作工班次
    pub operation_overrides: HashMap<String, OperationOverride>,
}

impl GlobalSettings {
    /// 以默认窗口与默认班次构造
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            start,
            holidays: Vec::new(),
            breakdowns: BTreeMap::new(),
            setup_window: DailyWindow::default(),
            production_window: ProductionWindow::AlwaysOpen,
            machines: Vec::new(),
            roster: ShiftDefinition::default_roster(),
            operation_overrides: HashMap::new(),
        }
    }

    pub fn with_holiday(mut self, holiday: Interval) -> Self {
        self.holidays.push(holiday);
        self
    }

    /// 登记故障机床；window 为 None 表示全程故障
    pub fn with_breakdown(mut self, machine: impl Into<String>, window: Option<Interval>) -> Self {
        let entry = self.breakdowns.entry(machine.into()).or_default();
        if let Some(w) = window {
            entry.push(w);
        }
        self
    }

    pub fn with_machines(mut self, machines: Vec<String>) -> Self {
        self.machines = machines;
        self
    }

    pub fn with_production_window(mut self, window: ProductionWindow) -> Self {
        self.production_window = window;
        self
    }

    pub fn with_setup_window(mut self, window: DailyWindow) -> Self {
        self.setup_window = window;
        self
    }

    /// 机床在给定区间内是否处于故障
    pub fn is_machine_down(&self, machine: &str, interval: &Interval) -> bool {
        self.downtime(machine, interval).is_some()
    }

    /// 机床故障与 interval 的冲突；多个故障时段重叠时取最晚的结束时刻
    pub fn downtime(&self, machine: &str, interval: &Interval) -> Option<Downtime> {
        let windows = self.breakdowns.get(machine)?;
        if windows.is_empty() {
            return Some(Downtime::WholeRun);
        }
        windows
            .iter()
            .filter(|w| w.overlaps(interval))
            .map(|w| w.end)
            .max()
            .map(Downtime::Until)
    }
}
