// ==========================================
// 机加工排产系统 - 领域模型层
// ==========================================
// 职责: 定义订单、工序、批次、区间、排产结果
// 红线: 不含解析逻辑,不含引擎逻辑
// ==========================================

pub mod error;
pub mod interval;
pub mod order;
pub mod schedule;
pub mod types;

// 重导出核心类型
pub use error::{DomainError, DomainResult};
pub use interval::{duration_from_minutes, duration_to_minutes, DailyWindow, Interval, ProductionWindow};
pub use order::{Batch, Breakdown, Downtime, Operation, Order};
pub use schedule::{
    format_duration, format_timestamp, OperatorShare, ProductionPause, RunSummary,
    ScheduleOutput, ScheduleRow, ScheduledOperation,
};
pub use types::{BatchMode, Priority, ShiftLabel};
