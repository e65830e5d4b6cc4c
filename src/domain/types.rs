// ==========================================
// 机加工排产系统 - 领域类型定义
// ==========================================
// 职责: 订单优先级、班次标签、分批模式等枚举
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 订单优先级 (Priority)
// ==========================================
// 顺序: Low < Normal < High < Urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,    // 低
    Normal, // 普通
    High,   // 高
    Urgent, // 加急
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Normal => write!(f, "Normal"),
            Priority::High => write!(f, "High"),
            Priority::Urgent => write!(f, "Urgent"),
        }
    }
}

impl Priority {
    /// 从外部字符串解析优先级（大小写不敏感，未知值视为 Normal）
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Priority::Low,
            "HIGH" => Priority::High,
            "URGENT" => Priority::Urgent,
            _ => Priority::Normal,
        }
    }

    /// High/Urgent 订单在分批时偏向更多批次
    pub fn prefers_parallelism(&self) -> bool {
        matches!(self, Priority::High | Priority::Urgent)
    }
}

// ==========================================
// 班次标签 (Shift Label)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftLabel {
    Morning,   // 早班 06:00-14:00
    Afternoon, // 中班 14:00-22:00
}

impl fmt::Display for ShiftLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftLabel::Morning => write!(f, "MORNING"),
            ShiftLabel::Afternoon => write!(f, "AFTERNOON"),
        }
    }
}

// ==========================================
// 分批模式 (Batch Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchMode {
    SingleBatch,     // 整单一批
    CustomBatchSize, // 固定批量切分
    AutoSplit,       // 按数量/优先级自动切分
}

impl Default for BatchMode {
    fn default() -> Self {
        BatchMode::AutoSplit
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchMode::SingleBatch => write!(f, "single-batch"),
            BatchMode::CustomBatchSize => write!(f, "custom-batch-size"),
            BatchMode::AutoSplit => write!(f, "auto-split"),
        }
    }
}

impl BatchMode {
    /// 从外部字符串解析分批模式（未知值视为 auto-split）
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "single-batch" | "single" => BatchMode::SingleBatch,
            "custom-batch-size" | "custom" => BatchMode::CustomBatchSize,
            _ => BatchMode::AutoSplit,
        }
    }
}
