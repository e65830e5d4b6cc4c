// ==========================================
// 机加工排产系统 - 导入层
// ==========================================
// 职责: 外部 JSON 记录 → 强类型领域对象
// 红线: 原始字符串（日期区间、机床列表）不进入引擎
// ==========================================

pub mod datetime_parser;
pub mod error;
pub mod order_importer;
pub mod raw;
pub mod settings_importer;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use order_importer::{load_orders, parse_orders_json, ImportOutcome, OrderImporter};
pub use raw::{RawOperation, RawOrder, RawSettings};
pub use settings_importer::{import_settings, load_settings, parse_settings_json};
