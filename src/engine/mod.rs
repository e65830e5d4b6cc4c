// ==========================================
// 机加工排产系统 - 引擎层
// ==========================================
// 职责: 分批、资源台账、机床/操作工选择、单件流计时、订单编排、结果校验
// 红线: 同一资源占用区间绝不重叠
// ==========================================

pub mod batch_planner;
pub mod error;
pub mod ledger;
pub mod machine_selector;
pub mod operator_selector;
pub mod orchestrator;
pub mod order_scheduler;
pub mod timing;
pub mod validator;

// 重导出核心引擎
pub use batch_planner::{BatchPlanner, BatchRequest};
pub use error::{EngineError, EngineResult};
pub use ledger::{LedgerSet, ResourceKind, ResourceLedger};
pub use machine_selector::{MachineChoice, MachineRequest, MachineSelector, SelectionRule};
pub use operator_selector::{OperatorAssignment, OperatorSelector};
pub use orchestrator::{ScheduleRun, SchedulingEngine};
pub use order_scheduler::{OrderOutcome, OrderScheduler};
pub use timing::{RunTiming, TimingCalculator, UpstreamFlow};
pub use validator::{ScheduleValidator, ValidationReport};
