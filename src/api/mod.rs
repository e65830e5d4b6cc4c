// ==========================================
// 机加工排产系统 - API 层
// ==========================================
// 职责: 对外排产入口（JSON 请求 → 排产结果）
// ==========================================

pub mod error;
pub mod schedule_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use schedule_api::{ScheduleApi, ScheduleRequest};
