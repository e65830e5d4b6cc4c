// ==========================================
// 机加工排产系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::error::DomainError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),

    // ===== 格式错误 =====
    #[error("日期格式错误 (字段 {field}): 期望 DD/MM/YYYY[ HH:MM] 或 YYYY-MM-DD[ HH:MM]，实际 {value}")]
    DateFormat { field: String, value: String },

    #[error("时间区间格式错误 (字段 {field}): 期望 \"开始→结束\" 或单个日期，实际 {value}")]
    RangeFormat { field: String, value: String },

    #[error("时间窗口格式错误 (字段 {field}): 期望 HH:MM-HH:MM，实际 {value}")]
    WindowFormat { field: String, value: String },

    // ===== 数据错误 =====
    #[error("缺少必填字段 ({record}): {field}")]
    MissingField { record: String, field: String },

    #[error("字段值无效 ({record}, 字段 {field}): {value}")]
    InvalidValue {
        record: String,
        field: String,
        value: String,
    },

    #[error("领域校验失败 ({record}): {source}")]
    Domain {
        record: String,
        #[source]
        source: DomainError,
    },
}

impl ImportError {
    pub fn domain(record: impl Into<String>, source: DomainError) -> Self {
        ImportError::Domain {
            record: record.into(),
            source,
        }
    }
}

pub type ImportResult<T> = Result<T, ImportError>;
