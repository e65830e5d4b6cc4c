// ==========================================
// 机加工排产系统 - 排产结果领域模型
// ==========================================
// ScheduledOperation: 每个 (批次, 工序) 一条，生成后只读
// 唯一例外: 校验器自动修复会改写计时字段
// ScheduleRow: 对外输出的扁平记录（格式化时间）
// ==========================================

use crate::domain::interval::Interval;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 对外时间格式: YYYY-MM-DD HH:MM
pub fn format_timestamp(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

/// 对外时长格式: XD YH ZM（按分钟四舍五入）
pub fn format_duration(d: Duration) -> String {
    let total_minutes = ((d.num_milliseconds() as f64) / 60_000.0).round().max(0.0) as i64;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;
    format!("{}D {}H {}M", days, hours, minutes)
}

// ==========================================
// OperatorShare - 操作工占用片段
// ==========================================
// 跨班调机时一个工序对应两个片段（原班次 + 下一班次）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorShare {
    pub operator: String,
    pub interval: Interval,
}

// ==========================================
// ProductionPause - 生产窗口暂停
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionPause {
    pub paused_at: NaiveDateTime,
    pub resumed_at: NaiveDateTime,
}

impl ProductionPause {
    pub fn duration(&self) -> Duration {
        self.resumed_at - self.paused_at
    }
}

// ==========================================
// ScheduledOperation - 已排工序
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOperation {
    // ===== 订单/批次 =====
    pub part_number: String,
    pub batch_id: String,
    pub batch_qty: u32,

    // ===== 工序 =====
    pub operation_seq: u32,
    pub operation_name: String,
    pub cycle_minutes: f64,

    // ===== 资源 =====
    pub machine: String,
    pub operator: String,                     // 展示用: "A" 或跨班 "A→C"；无调机为 "-"
    pub operator_segments: Vec<OperatorShare>, // 操作工实际占用片段
    pub setup_delayed: bool,                  // 调机相对期望时间被推迟
    pub spillover: bool,                      // 调机跨班拆分
    pub operator_emergency: bool,             // 操作工应急延迟

    // ===== 计时 =====
    pub setup: Interval,
    pub run: Interval,
    pub piece_starts: Vec<NaiveDateTime>,
    pub piece_completions: Vec<NaiveDateTime>,
    pub first_piece_done: NaiveDateTime,
    pub work_minutes: f64, // 纯加工分钟（批量 × 节拍）
    pub pauses: Vec<ProductionPause>,

    // ===== 告警 =====
    pub due_warning: Option<String>,
}

impl ScheduledOperation {
    /// 机床占用区间 [setup.start, run.end)
    pub fn machine_interval(&self) -> Interval {
        Interval {
            start: self.setup.start,
            end: self.run.end,
        }
    }

    /// 生产窗口关闭导致的暂停分钟
    pub fn paused_minutes(&self) -> i64 {
        self.pauses.iter().map(|p| p.duration().num_minutes()).sum()
    }

    /// 总时长文本（调机开始到加工结束）
    pub fn duration_text(&self) -> String {
        format_duration(self.run.end - self.setup.start)
    }

    /// 将加工段整体后移 delta（调机段不动），由校验器自动修复使用
    pub fn shift_run_end(&mut self, delta: Duration) {
        self.run.end += delta;
        for t in self.piece_completions.iter_mut() {
            *t += delta;
        }
        for t in self.piece_starts.iter_mut() {
            *t += delta;
        }
        self.first_piece_done += delta;
    }
}

// ==========================================
// ScheduleRow - 对外扁平输出
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    pub part_number: String,
    pub batch_id: String,
    pub batch_qty: u32,
    pub operation_seq: u32,
    pub operation_name: String,
    pub machine: String,
    pub person: String,
    pub setup_start: String,
    pub setup_end: String,
    pub run_start: String,
    pub run_end: String,
    pub first_piece_done: String,
    pub piece_completions: Vec<String>,
    pub timing: String,
    pub work_minutes: f64,
    pub paused_minutes: i64,
    pub setup_delayed: bool,
    pub spillover: bool,
    pub due_date_warning: Option<String>,
}

impl From<&ScheduledOperation> for ScheduleRow {
    fn from(op: &ScheduledOperation) -> Self {
        Self {
            part_number: op.part_number.clone(),
            batch_id: op.batch_id.clone(),
            batch_qty: op.batch_qty,
            operation_seq: op.operation_seq,
            operation_name: op.operation_name.clone(),
            machine: op.machine.clone(),
            person: op.operator.clone(),
            setup_start: format_timestamp(op.setup.start),
            setup_end: format_timestamp(op.setup.end),
            run_start: format_timestamp(op.run.start),
            run_end: format_timestamp(op.run.end),
            first_piece_done: format_timestamp(op.first_piece_done),
            piece_completions: op
                .piece_completions
                .iter()
                .map(|t| format_timestamp(*t))
                .collect(),
            timing: op.duration_text(),
            work_minutes: op.work_minutes,
            paused_minutes: op.paused_minutes(),
            setup_delayed: op.setup_delayed,
            spillover: op.spillover,
            due_date_warning: op.due_warning.clone(),
        }
    }
}

// ==========================================
// RunSummary / ScheduleOutput - 排产运行输出
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub total_orders: usize,
    pub total_operations: usize,
    pub completed_successfully: usize,
    pub late_orders: usize,
    pub validation_violations: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutput {
    pub rows: Vec<ScheduleRow>,
    pub alerts: Vec<String>,
    pub summary: RunSummary,
}

impl ScheduleOutput {
    /// 灾难性失败: 空结果 + 单条告警
    pub fn failed(run_id: impl Into<String>, total_orders: usize, alert: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            alerts: vec![alert.into()],
            summary: RunSummary {
                run_id: run_id.into(),
                total_orders,
                ..RunSummary::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::minutes(142)), "0D 2H 22M");
        assert_eq!(format_duration(Duration::minutes(24 * 60 + 61)), "1D 1H 1M");
        assert_eq!(format_duration(Duration::seconds(29)), "0D 0H 0M");
    }

    #[test]
    fn test_row_formatting() {
        let op = ScheduledOperation {
            part_number: "P-1".into(),
            batch_id: "B01".into(),
            batch_qty: 2,
            operation_seq: 10,
            operation_name: "Turning".into(),
            cycle_minutes: 10.0,
            machine: "M1".into(),
            operator: "A→C".into(),
            operator_segments: vec![],
            setup_delayed: true,
            spillover: true,
            operator_emergency: false,
            setup: Interval::new(dt(5, 7, 0), dt(5, 8, 10)).unwrap(),
            run: Interval::new(dt(5, 8, 10), dt(5, 8, 30)).unwrap(),
            piece_starts: vec![dt(5, 8, 10), dt(5, 8, 20)],
            piece_completions: vec![dt(5, 8, 20), dt(5, 8, 30)],
            first_piece_done: dt(5, 8, 20),
            work_minutes: 20.0,
            pauses: vec![ProductionPause {
                paused_at: dt(5, 8, 15),
                resumed_at: dt(5, 8, 20),
            }],
            due_warning: None,
        };
        let row = ScheduleRow::from(&op);
        assert_eq!(row.setup_start, "2025-09-05 07:00");
        assert_eq!(row.run_end, "2025-09-05 08:30");
        assert_eq!(row.timing, "0D 1H 30M");
        assert_eq!(row.piece_completions.len(), 2);
        assert_eq!(row.paused_minutes, 5);
        assert_eq!(row.work_minutes, 20.0);
        assert!(row.setup_delayed && row.spillover);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["workMinutes"], 20.0);
        assert_eq!(json["setupDelayed"], true);
    }
}
