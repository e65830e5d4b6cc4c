// ==========================================
// 机加工排产系统 - 订单 / 工序 / 批次领域模型
// ==========================================
// 红线: 订单与工序为不可变输入，排产过程不回写
// ==========================================

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::interval::{duration_from_minutes, DailyWindow, Interval};
use crate::domain::types::{BatchMode, Priority};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

// 单道工序调机 / 节拍上限（分钟，一周）
pub const MAX_OPERATION_MINUTES: f64 = 7.0 * 24.0 * 60.0;

// 单个订单数量上限
pub const MAX_ORDER_QUANTITY: u32 = 1_000_000;

// ==========================================
// Operation - 工序
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub seq: u32,                       // 工序号（订单内严格全序）
    pub name: String,                   // 工序名称
    pub setup_minutes: f64,             // 调机时长（分钟）
    pub cycle_minutes: f64,             // 单件节拍（分钟）
    pub min_batch_size: u32,            // 最小批量
    pub eligible_machines: Vec<String>, // 可用机床（保持输入顺序，去重）
}

impl Operation {
    /// 构造工序并校验不变量
    ///
    /// # 校验
    /// - 0 <= setup_minutes <= 一周（0 表示无需调机）
    /// - 0 < cycle_minutes <= 一周
    /// - eligible_machines 非空（去除空白与重复项后）
    pub fn new(
        seq: u32,
        name: impl Into<String>,
        setup_minutes: f64,
        cycle_minutes: f64,
        min_batch_size: u32,
        eligible_machines: Vec<String>,
    ) -> DomainResult<Self> {
        if !setup_minutes.is_finite() || !(0.0..=MAX_OPERATION_MINUTES).contains(&setup_minutes) {
            return Err(DomainError::InvalidDuration {
                field: format!("op{}.setup_minutes", seq),
                value: setup_minutes,
            });
        }
        if !cycle_minutes.is_finite() || cycle_minutes <= 0.0 || cycle_minutes > MAX_OPERATION_MINUTES {
            return Err(DomainError::InvalidDuration {
                field: format!("op{}.cycle_minutes", seq),
                value: cycle_minutes,
            });
        }

        let mut machines: Vec<String> = Vec::with_capacity(eligible_machines.len());
        for m in eligible_machines {
            let m = m.trim().to_string();
            if !m.is_empty() && !machines.contains(&m) {
                machines.push(m);
            }
        }
        if machines.is_empty() {
            return Err(DomainError::EmptyEligibleMachines { seq });
        }

        Ok(Self {
            seq,
            name: name.into(),
            setup_minutes,
            cycle_minutes,
            min_batch_size,
            eligible_machines: machines,
        })
    }

    pub fn needs_setup(&self) -> bool {
        self.setup_minutes > 0.0
    }

    pub fn setup_duration(&self) -> Duration {
        duration_from_minutes(self.setup_minutes)
    }

    pub fn cycle_duration(&self) -> Duration {
        duration_from_minutes(self.cycle_minutes)
    }

    /// 批量 qty 的纯加工时长
    pub fn run_duration(&self, qty: u32) -> Duration {
        duration_from_minutes(self.cycle_minutes * qty as f64)
    }
}

// ==========================================
// Breakdown - 订单级故障机床
// ==========================================
// window 为空表示整个排产期内不可用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub machine: String,
    pub window: Option<Interval>,
}

impl Breakdown {
    pub fn affects(&self, machine: &str, interval: &Interval) -> bool {
        self.downtime(machine, interval).is_some()
    }

    /// 故障与 interval 的冲突情况；无冲突返回 None
    pub fn downtime(&self, machine: &str, interval: &Interval) -> Option<Downtime> {
        if self.machine != machine {
            return None;
        }
        match self.window {
            None => Some(Downtime::WholeRun),
            Some(w) if w.overlaps(interval) => Some(Downtime::Until(w.end)),
            Some(_) => None,
        }
    }
}

/// 机床故障占用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downtime {
    WholeRun,             // 整个排产期不可用
    Until(NaiveDateTime), // 故障持续到该时刻
}

impl Downtime {
    /// 合并两段冲突，取更晚的恢复时刻
    pub fn merge(self, other: Downtime) -> Downtime {
        match (self, other) {
            (Downtime::Until(a), Downtime::Until(b)) => Downtime::Until(a.max(b)),
            _ => Downtime::WholeRun,
        }
    }
}

// ==========================================
// Order - 生产订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub part_number: String,                  // 零件号
    pub quantity: u32,                        // 总数量
    pub priority: Priority,                   // 优先级
    pub due: NaiveDateTime,                   // 交期
    pub operations: Vec<Operation>,           // 工序（按 seq 升序）
    pub start_override: Option<NaiveDateTime>, // 订单级开工时间
    pub breakdown: Option<Breakdown>,         // 订单级故障机床
    pub setup_window: Option<DailyWindow>,    // 订单级调机窗口
    pub batch_mode: BatchMode,                // 分批模式
    pub custom_batch_size: Option<u32>,       // 固定批量（custom-batch-size 模式）
}

impl Order {
    /// 构造订单
    ///
    /// 工序按 seq 排序；重复 seq 视为输入错误。
    /// 空工序列表允许构造，排产时作为输入缺陷处理。
    pub fn new(
        part_number: impl Into<String>,
        quantity: u32,
        priority: Priority,
        due: NaiveDateTime,
        mut operations: Vec<Operation>,
    ) -> DomainResult<Self> {
        let part_number = part_number.into();
        if quantity == 0 || quantity > MAX_ORDER_QUANTITY {
            return Err(DomainError::InvalidQuantity {
                field: format!("{}.quantity", part_number),
                value: quantity as i64,
            });
        }

        operations.sort_by_key(|op| op.seq);
        if let Some(dup) = operations.windows(2).find(|w| w[0].seq == w[1].seq) {
            return Err(DomainError::DuplicateOperationSeq {
                part_number,
                seq: dup[0].seq,
            });
        }

        Ok(Self {
            part_number,
            quantity,
            priority,
            due,
            operations,
            start_override: None,
            breakdown: None,
            setup_window: None,
            batch_mode: BatchMode::AutoSplit,
            custom_batch_size: None,
        })
    }

    pub fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start_override = Some(start);
        self
    }

    pub fn with_breakdown(mut self, breakdown: Breakdown) -> Self {
        self.breakdown = Some(breakdown);
        self
    }

    pub fn with_setup_window(mut self, window: DailyWindow) -> Self {
        self.setup_window = Some(window);
        self
    }

    pub fn with_batch_mode(mut self, mode: BatchMode, custom_size: Option<u32>) -> Self {
        self.batch_mode = mode;
        self.custom_batch_size = custom_size;
        self
    }

    /// 所有工序中最大的最小批量（分批下限）
    pub fn min_batch_size(&self) -> u32 {
        self.operations
            .iter()
            .map(|op| op.min_batch_size)
            .max()
            .unwrap_or(0)
    }
}

// ==========================================
// Batch - 批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,    // B01, B02, ...
    pub quantity: u32, // 批量
    pub index: usize,  // 批次序号（从 0 开始）
}

impl Batch {
    pub fn new(index: usize, quantity: u32) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                field: format!("batch[{}].quantity", index),
                value: 0,
            });
        }
        Ok(Self {
            id: format!("B{:02}", index + 1),
            quantity,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn due() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 10)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    fn op(seq: u32) -> Operation {
        Operation::new(seq, format!("OP{}", seq), 30.0, 2.0, 1, vec!["M1".to_string()]).unwrap()
    }

    #[test]
    fn test_operation_dedups_machines() {
        let op = Operation::new(
            10,
            "Turning",
            30.0,
            1.5,
            1,
            vec![" M1".to_string(), "M2".to_string(), "M1".to_string(), "".to_string()],
        )
        .unwrap();
        assert_eq!(op.eligible_machines, vec!["M1".to_string(), "M2".to_string()]);
        assert_eq!(op.run_duration(4), Duration::minutes(6));
    }

    #[test]
    fn test_operation_rejects_bad_input() {
        assert!(Operation::new(1, "X", -1.0, 1.0, 1, vec!["M1".into()]).is_err());
        assert!(Operation::new(1, "X", 10.0, -1.0, 1, vec!["M1".into()]).is_err());
        assert!(Operation::new(1, "X", 1e12, 1.0, 1, vec!["M1".into()]).is_err());
        assert!(Operation::new(1, "X", 10.0, 1e12, 1, vec!["M1".into()]).is_err());
        assert!(matches!(
            Operation::new(1, "X", 10.0, 1.0, 1, vec![" ".into()]),
            Err(DomainError::EmptyEligibleMachines { seq: 1 })
        ));
    }

    #[test]
    fn test_zero_setup_is_allowed() {
        let op = Operation::new(1, "Wash", 0.0, 1.0, 1, vec!["M1".into()]).unwrap();
        assert!(!op.needs_setup());
        assert_eq!(op.setup_duration(), Duration::zero());
    }

    #[test]
    fn test_breakdown_downtime() {
        let at = |h| NaiveDate::from_ymd_opt(2025, 9, 5).unwrap().and_hms_opt(h, 0, 0).unwrap();
        let window = Interval::new(at(10), at(12)).unwrap();
        let windowed = Breakdown {
            machine: "M1".into(),
            window: Some(window),
        };
        let busy = Interval::new(at(9), at(11)).unwrap();
        assert_eq!(windowed.downtime("M1", &busy), Some(Downtime::Until(at(12))));
        assert_eq!(windowed.downtime("M2", &busy), None);
        assert_eq!(windowed.downtime("M1", &Interval::new(at(12), at(13)).unwrap()), None);

        let whole = Breakdown {
            machine: "M1".into(),
            window: None,
        };
        assert_eq!(whole.downtime("M1", &busy), Some(Downtime::WholeRun));
        assert_eq!(
            Downtime::Until(at(10)).merge(Downtime::Until(at(12))),
            Downtime::Until(at(12))
        );
    }

    #[test]
    fn test_order_sorts_operations_and_rejects_duplicates() {
        let order = Order::new("P-1", 10, Priority::Normal, due(), vec![op(30), op(10), op(20)]).unwrap();
        let seqs: Vec<u32> = order.operations.iter().map(|o| o.seq).collect();
        assert_eq!(seqs, vec![10, 20, 30]);

        let dup = Order::new("P-1", 10, Priority::Normal, due(), vec![op(10), op(10)]);
        assert!(matches!(dup, Err(DomainError::DuplicateOperationSeq { seq: 10, .. })));

        assert!(Order::new("P-1", 0, Priority::Normal, due(), vec![op(10)]).is_err());
        assert!(Order::new("P-1", MAX_ORDER_QUANTITY + 1, Priority::Normal, due(), vec![op(10)]).is_err());
    }

    #[test]
    fn test_batch_id_format() {
        assert_eq!(Batch::new(0, 5).unwrap().id, "B01");
        assert_eq!(Batch::new(11, 5).unwrap().id, "B12");
        assert!(Batch::new(0, 0).is_err());
    }
}
