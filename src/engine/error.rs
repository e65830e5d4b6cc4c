// ==========================================
// 机加工排产系统 - 引擎错误类型
// ==========================================
// 分类:
//   输入缺陷 / 资源耗尽 → 订单级隔离，转为告警
//   完整性破坏 → 程序缺陷，直接中止整个排产运行
// ==========================================

use crate::domain::error::DomainError;
use crate::domain::interval::Interval;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ===== 输入缺陷 =====
    #[error("订单 {part_number} 没有任何工序")]
    NoOperations { part_number: String },

    #[error("订单 {part_number} 工序 {seq} 引用了未知机床 {machine}")]
    UnknownMachine {
        part_number: String,
        seq: u32,
        machine: String,
    },

    #[error("无效输入: {0}")]
    InvalidInput(String),

    // ===== 资源耗尽 =====
    #[error("工序 {seq} 无可用操作工: 调机区间 {start} ~ {end} 所有冲突消解策略均失败")]
    OperatorUnavailable {
        seq: u32,
        start: String,
        end: String,
    },

    // ===== 完整性破坏（致命） =====
    #[error("排产完整性被破坏: 资源 {resource} 区间 {first:?} 与 {second:?} 重叠")]
    IntegrityViolation {
        resource: String,
        first: Interval,
        second: Interval,
    },
}

impl EngineError {
    /// 是否致命（需中止整个运行）
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::IntegrityViolation { .. })
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        EngineError::InvalidInput(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
