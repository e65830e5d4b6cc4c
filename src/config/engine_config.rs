// ==========================================
// 机加工排产系统 - 引擎参数配置
// ==========================================
// 存储: 扁平 key-value（JSON 对象，值为字符串或数字）
// 规则: 缺失键使用默认值；格式错误的值回退默认值并记录告警
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use tracing::warn;

// 取值范围
const MINUTES_RANGE: RangeInclusive<i64> = 0..=1440;
const DAYS_RANGE: RangeInclusive<i64> = 0..=366;
const BATCH_SIZE_RANGE: RangeInclusive<u32> = 1..=1_000_000;

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const CUSTOM_BATCH_SIZE: &str = "batch.custom_size";
    pub const QUICK_START_TOLERANCE_MIN: &str = "machine.quick_start_tolerance_min";
    pub const NEAR_START_TOLERANCE_MIN: &str = "machine.near_start_tolerance_min";
    pub const EMERGENCY_DELAY_MIN: &str = "operator.emergency_delay_min";
    pub const MICRO_DELAY_MAX_MIN: &str = "operator.micro_delay_max_min";
    pub const ALTERNATE_MICRO_DELAY_MAX_MIN: &str = "operator.alternate_micro_delay_max_min";
    pub const ESCALATING_DELAYS_MIN: &str = "operator.escalating_delays_min";
    pub const AFTERNOON_BONUS: &str = "operator.afternoon_bonus";
    pub const SEARCH_HORIZON_DAYS: &str = "operator.search_horizon_days";
    pub const URGENT_HORIZON_DAYS: &str = "run.urgent_horizon_days";
    pub const VALIDATOR_AUTO_FIX: &str = "validator.auto_fix";
}

// ==========================================
// EngineConfig - 引擎可调参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub custom_batch_size: u32,            // 固定批量默认值
    pub quick_start_tolerance_min: i64,    // 机床"立即可开工"容差
    pub near_start_tolerance_min: i64,     // 机床"近期可开工"容差
    pub emergency_delay_min: i64,          // 操作工应急延迟
    pub micro_delay_max_min: i64,          // 同一操作工微延迟上限
    pub alternate_micro_delay_max_min: i64, // 替代操作工微延迟上限
    pub escalating_delays_min: Vec<i64>,   // 原操作工递增延迟
    pub afternoon_bonus: f64,              // 中班优先分
    pub search_horizon_days: i64,          // 操作工逐班搜索上限
    pub urgent_horizon_days: i64,          // 紧急订单告警阈值
    pub validator_auto_fix: bool,          // 校验器自动修复
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            custom_batch_size: 300,
            quick_start_tolerance_min: 5,
            near_start_tolerance_min: 30,
            emergency_delay_min: 30,
            micro_delay_max_min: 15,
            alternate_micro_delay_max_min: 3,
            escalating_delays_min: vec![10, 20, 30],
            afternoon_bonus: 50.0,
            search_horizon_days: 30,
            urgent_horizon_days: 2,
            validator_auto_fix: true,
        }
    }
}

impl EngineConfig {
    /// 从 key-value 映射加载配置
    ///
    /// # 参数
    /// - kv: 配置键 → 配置值（字符串）
    ///
    /// # 返回
    /// 合并默认值后的配置
    pub fn from_kv(kv: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            custom_batch_size: read_bounded(
                kv,
                config_keys::CUSTOM_BATCH_SIZE,
                defaults.custom_batch_size,
                BATCH_SIZE_RANGE,
            ),
            quick_start_tolerance_min: read_bounded(
                kv,
                config_keys::QUICK_START_TOLERANCE_MIN,
                defaults.quick_start_tolerance_min,
                MINUTES_RANGE,
            ),
            near_start_tolerance_min: read_bounded(
                kv,
                config_keys::NEAR_START_TOLERANCE_MIN,
                defaults.near_start_tolerance_min,
                MINUTES_RANGE,
            ),
            emergency_delay_min: read_bounded(
                kv,
                config_keys::EMERGENCY_DELAY_MIN,
                defaults.emergency_delay_min,
                MINUTES_RANGE,
            ),
            micro_delay_max_min: read_bounded(
                kv,
                config_keys::MICRO_DELAY_MAX_MIN,
                defaults.micro_delay_max_min,
                MINUTES_RANGE,
            ),
            alternate_micro_delay_max_min: read_bounded(
                kv,
                config_keys::ALTERNATE_MICRO_DELAY_MAX_MIN,
                defaults.alternate_micro_delay_max_min,
                MINUTES_RANGE,
            ),
            escalating_delays_min: read_list(
                kv,
                config_keys::ESCALATING_DELAYS_MIN,
                defaults.escalating_delays_min,
            ),
            afternoon_bonus: match read_parsed(kv, config_keys::AFTERNOON_BONUS, defaults.afternoon_bonus) {
                bonus if bonus.is_finite() => bonus,
                _ => defaults.afternoon_bonus,
            },
            search_horizon_days: read_bounded(
                kv,
                config_keys::SEARCH_HORIZON_DAYS,
                defaults.search_horizon_days,
                DAYS_RANGE,
            ),
            urgent_horizon_days: read_bounded(
                kv,
                config_keys::URGENT_HORIZON_DAYS,
                defaults.urgent_horizon_days,
                DAYS_RANGE,
            ),
            validator_auto_fix: read_parsed(kv, config_keys::VALIDATOR_AUTO_FIX, defaults.validator_auto_fix),
        }
    }

    /// 取值范围检查（供直接构造的配置使用）
    pub fn check_bounds(&self) -> Result<(), String> {
        let minutes = [
            (config_keys::QUICK_START_TOLERANCE_MIN, self.quick_start_tolerance_min),
            (config_keys::NEAR_START_TOLERANCE_MIN, self.near_start_tolerance_min),
            (config_keys::EMERGENCY_DELAY_MIN, self.emergency_delay_min),
            (config_keys::MICRO_DELAY_MAX_MIN, self.micro_delay_max_min),
            (config_keys::ALTERNATE_MICRO_DELAY_MAX_MIN, self.alternate_micro_delay_max_min),
        ];
        for (key, value) in minutes {
            if !MINUTES_RANGE.contains(&value) {
                return Err(format!("{} 超出范围: {}", key, value));
            }
        }
        if let Some(bad) = self.escalating_delays_min.iter().find(|v| !MINUTES_RANGE.contains(*v)) {
            return Err(format!("{} 超出范围: {}", config_keys::ESCALATING_DELAYS_MIN, bad));
        }
        for (key, value) in [
            (config_keys::SEARCH_HORIZON_DAYS, self.search_horizon_days),
            (config_keys::URGENT_HORIZON_DAYS, self.urgent_horizon_days),
        ] {
            if !DAYS_RANGE.contains(&value) {
                return Err(format!("{} 超出范围: {}", key, value));
            }
        }
        if !BATCH_SIZE_RANGE.contains(&self.custom_batch_size) {
            return Err(format!("{} 超出范围: {}", config_keys::CUSTOM_BATCH_SIZE, self.custom_batch_size));
        }
        if !self.afternoon_bonus.is_finite() {
            return Err(format!("{} 不是有效数值", config_keys::AFTERNOON_BONUS));
        }
        Ok(())
    }

    /// 从 JSON 对象加载（值可为字符串/数字/布尔）
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: HashMap<String, serde_json::Value> = serde_json::from_str(raw)?;
        Ok(Self::from_values(value))
    }

    /// 从已解析的 JSON 键值加载
    pub fn from_values(values: HashMap<String, serde_json::Value>) -> Self {
        let kv = values
            .into_iter()
            .map(|(k, v)| {
                let text = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, text)
            })
            .collect();
        Self::from_kv(&kv)
    }
}

fn read_parsed<T>(kv: &HashMap<String, String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug,
{
    match kv.get(key) {
        None => default,
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = ?default, "配置值格式错误，使用默认值");
            default
        }),
    }
}

/// 解析后检查范围，越界同样回退默认值
fn read_bounded<T>(kv: &HashMap<String, String>, key: &str, default: T, range: RangeInclusive<T>) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug + PartialOrd,
{
    let value = read_parsed(kv, key, default);
    if range.contains(&value) {
        value
    } else {
        warn!(key, value = ?value, default = ?default, "配置值超出范围，使用默认值");
        default
    }
}

/// 逗号分隔或 JSON 数组形式的整数列表（每项 0..=1440 分钟）
fn read_list(kv: &HashMap<String, String>, key: &str, default: Vec<i64>) -> Vec<i64> {
    let raw = match kv.get(key) {
        Some(raw) => raw,
        None => return default,
    };
    let parsed: Result<Vec<i64>, _> = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().parse::<i64>())
        .collect();
    match parsed {
        Ok(list) if !list.is_empty() && list.iter().all(|v| MINUTES_RANGE.contains(v)) => list,
        _ => {
            warn!(key, value = %raw, "配置列表格式错误，使用默认值");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.custom_batch_size, 300);
        assert_eq!(config.escalating_delays_min, vec![10, 20, 30]);
        assert!(config.validator_auto_fix);
    }

    #[test]
    fn test_from_kv_overrides_and_fallbacks() {
        let mut kv = HashMap::new();
        kv.insert(config_keys::CUSTOM_BATCH_SIZE.to_string(), "120".to_string());
        kv.insert(config_keys::EMERGENCY_DELAY_MIN.to_string(), "abc".to_string());
        kv.insert(config_keys::ESCALATING_DELAYS_MIN.to_string(), "5, 15".to_string());
        kv.insert(config_keys::VALIDATOR_AUTO_FIX.to_string(), "false".to_string());

        let config = EngineConfig::from_kv(&kv);
        assert_eq!(config.custom_batch_size, 120);
        assert_eq!(config.emergency_delay_min, 30);
        assert_eq!(config.escalating_delays_min, vec![5, 15]);
        assert!(!config.validator_auto_fix);
    }

    #[test]
    fn test_from_json_accepts_numbers() {
        let config = EngineConfig::from_json(
            r#"{"batch.custom_size": 250, "operator.escalating_delays_min": "[10,20]"}"#,
        )
        .unwrap();
        assert_eq!(config.custom_batch_size, 250);
        assert_eq!(config.escalating_delays_min, vec![10, 20]);
    }

    #[test]
    fn test_zero_custom_size_falls_back() {
        let mut kv = HashMap::new();
        kv.insert(config_keys::CUSTOM_BATCH_SIZE.to_string(), "0".to_string());
        assert_eq!(EngineConfig::from_kv(&kv).custom_batch_size, 300);
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let mut kv = HashMap::new();
        kv.insert(config_keys::URGENT_HORIZON_DAYS.to_string(), "200000000".to_string());
        kv.insert(config_keys::SEARCH_HORIZON_DAYS.to_string(), "-3".to_string());
        kv.insert(config_keys::EMERGENCY_DELAY_MIN.to_string(), "99999999999".to_string());
        kv.insert(config_keys::ESCALATING_DELAYS_MIN.to_string(), "10, 9999999".to_string());
        kv.insert(config_keys::AFTERNOON_BONUS.to_string(), "NaN".to_string());

        let config = EngineConfig::from_kv(&kv);
        assert_eq!(config, EngineConfig::default());
        assert!(config.check_bounds().is_ok());
    }

    #[test]
    fn test_check_bounds_rejects_direct_construction() {
        let config = EngineConfig {
            urgent_horizon_days: 200_000_000,
            ..EngineConfig::default()
        };
        assert!(config.check_bounds().is_err());
        let config = EngineConfig {
            escalating_delays_min: vec![10, -5],
            ..EngineConfig::default()
        };
        assert!(config.check_bounds().is_err());
    }
}
