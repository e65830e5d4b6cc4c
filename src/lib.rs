// ==========================================
// 机加工排产系统 - 核心库
// ==========================================
// 职责: 订单分批、机床/操作工分配、单件流计时、排产校验
// 运行模型: 单线程、同步、确定性；一次运行一个引擎实例
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 配置层 - 全局设置、班次日历、引擎参数
pub mod config;

// 导入层 - 外部 JSON 记录
pub mod importer;

// 引擎层 - 排产规则
pub mod engine;

// API 层 - 对外入口
pub mod api;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BatchMode, Priority, ShiftLabel};

// 领域实体
pub use domain::{
    Batch, Interval, Operation, Order, RunSummary, ScheduleOutput, ScheduleRow,
    ScheduledOperation,
};

// 配置
pub use config::{EngineConfig, GlobalSettings, ShiftCalendar, ShiftDefinition};

// 引擎
pub use engine::{EngineError, SchedulingEngine, ScheduleRun};

// API
pub use api::{ScheduleApi, ScheduleRequest};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "机加工排产系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
