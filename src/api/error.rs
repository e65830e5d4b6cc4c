// ==========================================
// 机加工排产系统 - API层错误类型
// ==========================================
// 职责: 汇总导入层与引擎层错误，给出用户可读的原因
// ==========================================

use crate::engine::error::EngineError;
use crate::importer::error::ImportError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("导入失败: {0}")]
    Import(#[from] ImportError),

    #[error("排产失败: {0}")]
    Engine(#[from] EngineError),

    #[error("请求格式错误: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}

impl ApiError {
    /// 输出给调用方的单条告警
    pub fn to_alert(&self) -> String {
        match self {
            ApiError::Engine(e) if e.is_fatal() => format!("SCHEDULING_ABORTED: {}", e),
            other => format!("SCHEDULING_FAILED: {}", other),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
