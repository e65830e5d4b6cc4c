// ==========================================
// 机加工排产系统 - 配置层
// ==========================================
// 职责: 全局设置、班次日历、引擎参数
// ==========================================

pub mod engine_config;
pub mod settings;
pub mod shift_calendar;

// 重导出核心配置
pub use engine_config::{config_keys, EngineConfig};
pub use settings::{GlobalSettings, OperationOverride};
pub use shift_calendar::{ShiftCalendar, ShiftDefinition};
