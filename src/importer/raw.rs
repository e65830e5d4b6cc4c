// ==========================================
// 机加工排产系统 - 外部原始记录
// ==========================================
// 职责: 与外部 JSON 字段一一对应的原始结构（serde）
// 约定: 数值字段允许以数字或文本给出；机床列表允许逗号分隔文本或数组
// 原始记录只在导入边界使用，不进入引擎
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// 宽松字段类型
// ==========================================

/// 数字或文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrText::Number(n) => Some(*n),
            NumberOrText::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn raw(&self) -> String {
        match self {
            NumberOrText::Number(n) => n.to_string(),
            NumberOrText::Text(s) => s.clone(),
        }
    }
}

/// 逗号分隔文本或数组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextList {
    List(Vec<String>),
    Text(String),
}

impl TextList {
    pub fn items(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            TextList::List(items) => items.iter().map(|s| s.as_str()).collect(),
            TextList::Text(s) => s.split(',').collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for TextList {
    fn default() -> Self {
        TextList::List(Vec::new())
    }
}

/// 窗口: "HH:MM-HH:MM" 或 {start, end}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawWindow {
    Text(String),
    Range { start: String, end: String },
}

// ==========================================
// 订单 / 工序
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOperation {
    #[serde(rename = "OperationSeq")]
    pub seq: NumberOrText,
    #[serde(rename = "OperationName", default)]
    pub name: String,
    #[serde(rename = "SetupTime_Min")]
    pub setup_minutes: NumberOrText,
    #[serde(rename = "CycleTime_Min")]
    pub cycle_minutes: NumberOrText,
    #[serde(rename = "Minimum_BatchSize", default)]
    pub min_batch_size: Option<NumberOrText>,
    #[serde(rename = "EligibleMachines", default)]
    pub eligible_machines: TextList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub part_number: String,
    pub quantity: NumberOrText,
    #[serde(default)]
    pub priority: Option<String>,
    pub due_date: String,
    #[serde(default)]
    pub operations: Vec<RawOperation>,
    #[serde(default)]
    pub breakdown_machine: Option<String>,
    #[serde(default)]
    pub breakdown_date_time: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub setup_window: Option<RawWindow>,
    #[serde(default)]
    pub batch_mode: Option<String>,
    #[serde(default)]
    pub custom_batch_size: Option<NumberOrText>,
}

// ==========================================
// 全局设置
// ==========================================

/// 操作工班次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawShift {
    pub id: String,
    pub start_hour: u32,
    pub end_hour: u32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub rotation_index: Option<usize>,
}

/// 工序参数覆写
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOverride {
    #[serde(default)]
    pub setup_minutes: Option<NumberOrText>,
    #[serde(default)]
    pub cycle_minutes: Option<NumberOrText>,
    #[serde(default)]
    pub eligible_machines: Option<TextList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSettings {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub holidays: Vec<String>,
    #[serde(default)]
    pub breakdown_machines: TextList,
    #[serde(default)]
    pub breakdown_date_time: Option<String>,
    #[serde(default)]
    pub setup_window: Option<RawWindow>,
    #[serde(default)]
    pub production_window: Option<RawWindow>,
    #[serde(default)]
    pub machines: TextList,
    #[serde(default)]
    pub operators: Vec<RawShift>,
    #[serde(default)]
    pub operation_overrides: HashMap<String, RawOverride>,
}
