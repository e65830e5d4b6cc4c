// ==========================================
// 机加工排产系统 - 全局设置导入
// ==========================================
// 职责: RawSettings → GlobalSettings
// 字符串形式的日期区间、窗口、机床列表只在此处解析一次
// ==========================================

use crate::config::settings::{GlobalSettings, OperationOverride};
use crate::config::shift_calendar::ShiftDefinition;
use crate::domain::interval::{DailyWindow, ProductionWindow};
use crate::domain::types::ShiftLabel;
use crate::importer::datetime_parser::{
    parse_datetime, parse_instant, parse_production_window, parse_range, parse_window,
    window_from_parts,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::raw::{NumberOrText, RawOverride, RawSettings, RawShift, RawWindow};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

const RECORD: &str = "settings";
// 中班判定的开始小时
const AFTERNOON_FROM_HOUR: u32 = 12;

/// 从 JSON 文本解析设置
pub fn parse_settings_json(json: &str) -> ImportResult<GlobalSettings> {
    let raw: RawSettings = serde_json::from_str(json)?;
    import_settings(&raw)
}

/// 从文件加载设置
pub fn load_settings(path: &Path) -> ImportResult<GlobalSettings> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    let json = fs::read_to_string(path)?;
    parse_settings_json(&json)
}

/// RawSettings → GlobalSettings
#[instrument(skip_all)]
pub fn import_settings(raw: &RawSettings) -> ImportResult<GlobalSettings> {
    let mut settings = GlobalSettings::new(parse_start(raw)?);

    for holiday in &raw.holidays {
        settings = settings.with_holiday(parse_range("holidays", holiday)?);
    }

    let breakdown_window = raw
        .breakdown_date_time
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_range("breakdownDateTime", s))
        .transpose()?;
    for machine in raw.breakdown_machines.items() {
        settings = settings.with_breakdown(machine, breakdown_window);
    }

    if let Some(window) = &raw.setup_window {
        settings = settings.with_setup_window(daily_window("setupWindow", window)?);
    }
    if let Some(window) = &raw.production_window {
        settings = settings.with_production_window(production_window(window)?);
    }

    settings = settings.with_machines(raw.machines.items());

    if !raw.operators.is_empty() {
        settings.roster = raw
            .operators
            .iter()
            .enumerate()
            .map(|(idx, shift)| shift_definition(idx, shift))
            .collect::<ImportResult<Vec<_>>>()?;
    }

    settings.operation_overrides = raw
        .operation_overrides
        .iter()
        .map(|(name, o)| Ok((name.trim().to_string(), operation_override(name, o)?)))
        .collect::<ImportResult<HashMap<_, _>>>()?;

    debug!(
        start = %settings.start,
        holidays = settings.holidays.len(),
        breakdowns = settings.breakdowns.len(),
        operators = settings.roster.len(),
        "全局设置导入完成"
    );
    Ok(settings)
}

/// 窗口: 文本 "HH:MM-HH:MM" 或 {start, end}
pub fn daily_window(field: &str, window: &RawWindow) -> ImportResult<DailyWindow> {
    match window {
        RawWindow::Text(text) => parse_window(field, text),
        RawWindow::Range { start, end } => window_from_parts(field, start, end),
    }
}

fn production_window(window: &RawWindow) -> ImportResult<ProductionWindow> {
    match window {
        RawWindow::Text(text) => parse_production_window("productionWindow", text),
        RawWindow::Range { .. } => daily_window("productionWindow", window).map(ProductionWindow::Daily),
    }
}

/// 开工时间: startDateTime 优先，否则 startDate + startTime（缺省 00:00）
fn parse_start(raw: &RawSettings) -> ImportResult<chrono::NaiveDateTime> {
    if let Some(text) = raw.start_date_time.as_deref().filter(|s| !s.trim().is_empty()) {
        return parse_datetime("startDateTime", text);
    }
    let date = raw
        .start_date
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ImportError::MissingField {
            record: RECORD.to_string(),
            field: "startDateTime".to_string(),
        })?;
    let date = parse_instant("startDate", date)?.at.date();
    let time = match raw.start_time.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(text) => NaiveTime::parse_from_str(text.trim(), "%H:%M").map_err(|_| {
            ImportError::DateFormat {
                field: "startTime".to_string(),
                value: text.to_string(),
            }
        })?,
        None => NaiveTime::MIN,
    };
    Ok(date.and_time(time))
}

fn shift_definition(idx: usize, raw: &RawShift) -> ImportResult<ShiftDefinition> {
    let label = match raw.label.as_deref().map(|s| s.trim().to_lowercase()) {
        Some(l) if l == "afternoon" => ShiftLabel::Afternoon,
        Some(l) if l == "morning" => ShiftLabel::Morning,
        _ if raw.start_hour >= AFTERNOON_FROM_HOUR => ShiftLabel::Afternoon,
        _ => ShiftLabel::Morning,
    };
    ShiftDefinition::new(
        raw.id.trim(),
        raw.start_hour,
        raw.end_hour,
        label,
        raw.rotation_index.unwrap_or(idx),
    )
    .map_err(|e| ImportError::domain(format!("{}.operators[{}]", RECORD, idx), e))
}

fn operation_override(name: &str, raw: &RawOverride) -> ImportResult<OperationOverride> {
    // 调机允许为 0，节拍必须为正
    let minutes = |field: &str, value: &Option<NumberOrText>, allow_zero: bool| -> ImportResult<Option<f64>> {
        match value {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .filter(|m| m.is_finite() && (*m > 0.0 || (allow_zero && *m == 0.0)))
                .map(Some)
                .ok_or_else(|| ImportError::InvalidValue {
                    record: format!("{}.operationOverrides.{}", RECORD, name),
                    field: field.to_string(),
                    value: v.raw(),
                }),
        }
    };
    Ok(OperationOverride {
        setup_minutes: minutes("setupMinutes", &raw.setup_minutes, true)?,
        cycle_minutes: minutes("cycleMinutes", &raw.cycle_minutes, false)?,
        eligible_machines: raw
            .eligible_machines
            .as_ref()
            .map(|m| m.items())
            .filter(|m| !m.is_empty()),
    })
}
