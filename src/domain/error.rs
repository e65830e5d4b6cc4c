// ==========================================
// 机加工排产系统 - 领域模型错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use chrono::NaiveDateTime;
use thiserror::Error;

/// 领域对象构造失败（不变量不成立）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("无效区间: start={start} 必须早于 end={end}")]
    InvalidInterval {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("无效数量 ({field}): {value}")]
    InvalidQuantity { field: String, value: i64 },

    #[error("无效时长 ({field}): {value} 分钟")]
    InvalidDuration { field: String, value: f64 },

    #[error("工序 {seq} 未配置可用机床")]
    EmptyEligibleMachines { seq: u32 },

    #[error("零件 {part_number} 存在重复工序号 {seq}")]
    DuplicateOperationSeq { part_number: String, seq: u32 },

    #[error("无效时间窗口: {0}")]
    InvalidWindow(String),

    #[error("时间超出范围: {base} + {minutes} 分钟")]
    TimeOverflow { base: NaiveDateTime, minutes: i64 },

    #[error("时间超出排产范围 ({field}): {value}")]
    OutOfPlanningRange { field: String, value: NaiveDateTime },
}

pub type DomainResult<T> = Result<T, DomainError>;
