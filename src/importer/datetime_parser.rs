// ==========================================
// 机加工排产系统 - 日期/时间解析
// ==========================================
// 支持:
//   DD/MM/YYYY[ HH:MM]、YYYY-MM-DD[ HH:MM]、ISO-8601（含 T / Z / 时区偏移）
//   区间 "开始→结束"（也接受 "->"），单个日期视为整天
//   日内窗口 "HH:MM-HH:MM"，生产窗口 "24x7"
// 时间一律按工厂本地时间理解，带偏移的时间取其书写的本地时刻
// ==========================================

use crate::domain::interval::{DailyWindow, Interval, ProductionWindow};
use crate::importer::error::{ImportError, ImportResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

const RANGE_SEPARATORS: &[&str] = &["→", "->"];

/// 解析结果: 时刻 + 是否只给了日期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInstant {
    pub at: NaiveDateTime,
    pub date_only: bool,
}

/// 解析日期或日期时间
///
/// # 参数
/// - field: 字段名（用于错误信息）
/// - value: 原始字符串
pub fn parse_instant(field: &str, value: &str) -> ImportResult<ParsedInstant> {
    let text = value.trim();
    if text.is_empty() {
        return Err(date_error(field, value));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(ParsedInstant {
            at: dt.naive_local(),
            date_only: false,
        });
    }

    let stripped = text.strip_suffix('Z').unwrap_or(text);
    for fmt in DATETIME_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(stripped, fmt) {
            return Ok(ParsedInstant {
                at,
                date_only: false,
            });
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(stripped, fmt) {
            return Ok(ParsedInstant {
                at: date.and_time(NaiveTime::MIN),
                date_only: true,
            });
        }
    }
    Err(date_error(field, value))
}

/// 解析时刻（只给日期时取当日 00:00）
pub fn parse_datetime(field: &str, value: &str) -> ImportResult<NaiveDateTime> {
    parse_instant(field, value).map(|p| p.at)
}

/// 解析交期（只给日期时取当日 23:59）
pub fn parse_due(field: &str, value: &str) -> ImportResult<NaiveDateTime> {
    let parsed = parse_instant(field, value)?;
    Ok(if parsed.date_only {
        parsed.at + Duration::days(1) - Duration::minutes(1)
    } else {
        parsed.at
    })
}

/// 解析时间区间
///
/// - "a→b": 若 b 只给日期，则包含 b 整天
/// - 单个日期: 整天
pub fn parse_range(field: &str, value: &str) -> ImportResult<Interval> {
    let text = value.trim();
    let split = RANGE_SEPARATORS
        .iter()
        .find_map(|sep| text.split_once(sep));

    let (start, end) = match split {
        Some((a, b)) => {
            let start = parse_instant(field, a)?.at;
            let end = parse_instant(field, b)?;
            let end = if end.date_only {
                end.at + Duration::days(1)
            } else {
                end.at
            };
            (start, end)
        }
        None => {
            let single = parse_instant(field, text)?;
            if !single.date_only {
                return Err(range_error(field, value));
            }
            return Ok(Interval::whole_day(single.at.date()));
        }
    };

    Interval::new(start, end).map_err(|_| range_error(field, value))
}

/// 解析日内窗口 "HH:MM-HH:MM"
pub fn parse_window(field: &str, value: &str) -> ImportResult<DailyWindow> {
    let (a, b) = value
        .trim()
        .split_once('-')
        .ok_or_else(|| window_error(field, value))?;
    window_from_parts(field, a, b).map_err(|_| window_error(field, value))
}

/// 由开始/结束两部分构造窗口
pub fn window_from_parts(field: &str, start: &str, end: &str) -> ImportResult<DailyWindow> {
    let start = parse_time(field, start)?;
    let end = parse_time(field, end)?;
    DailyWindow::new(start, end).map_err(|_| window_error(field, &format!("{}-{}", start, end)))
}

/// 解析生产窗口: "24x7" / "24/7" / 空 → 全天候，否则按日内窗口
pub fn parse_production_window(field: &str, value: &str) -> ImportResult<ProductionWindow> {
    let text = value.trim().to_lowercase();
    if text.is_empty() || text == "24x7" || text == "24/7" || text == "24*7" {
        return Ok(ProductionWindow::AlwaysOpen);
    }
    parse_window(field, &text).map(ProductionWindow::Daily)
}

fn parse_time(field: &str, value: &str) -> ImportResult<NaiveTime> {
    let text = value.trim();
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .map_err(|_| window_error(field, value))
}

fn date_error(field: &str, value: &str) -> ImportError {
    ImportError::DateFormat {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn range_error(field: &str, value: &str) -> ImportError {
    ImportError::RangeFormat {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn window_error(field: &str, value: &str) -> ImportError {
    ImportError::WindowFormat {
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_supported_datetime_formats() {
        assert_eq!(parse_datetime("f", "05/09/2025 07:00").unwrap(), dt(2025, 9, 5, 7, 0));
        assert_eq!(parse_datetime("f", "2025-09-05 07:00").unwrap(), dt(2025, 9, 5, 7, 0));
        assert_eq!(parse_datetime("f", "2025-09-05T07:00Z").unwrap(), dt(2025, 9, 5, 7, 0));
        assert_eq!(parse_datetime("f", "2025-09-05T07:00:00+02:00").unwrap(), dt(2025, 9, 5, 7, 0));
        assert_eq!(parse_datetime("f", "05/09/2025").unwrap(), dt(2025, 9, 5, 0, 0));
        assert!(matches!(
            parse_datetime("dueDate", "next friday"),
            Err(ImportError::DateFormat { .. })
        ));
    }

    #[test]
    fn test_due_date_only_means_end_of_day() {
        assert_eq!(parse_due("dueDate", "2025-09-10").unwrap(), dt(2025, 9, 10, 23, 59));
        assert_eq!(parse_due("dueDate", "2025-09-10 12:00").unwrap(), dt(2025, 9, 10, 12, 0));
    }

    #[test]
    fn test_ranges() {
        let r = parse_range("holidays", "05/09/2025 12:00→05/09/2025 18:00").unwrap();
        assert_eq!(r, Interval::new(dt(2025, 9, 5, 12, 0), dt(2025, 9, 5, 18, 0)).unwrap());

        // 结束只给日期 → 包含整天
        let r = parse_range("holidays", "2025-09-06→2025-09-07").unwrap();
        assert_eq!(r, Interval::new(dt(2025, 9, 6, 0, 0), dt(2025, 9, 8, 0, 0)).unwrap());

        let r = parse_range("holidays", "2025-09-06").unwrap();
        assert_eq!(r.duration(), Duration::days(1));

        assert!(parse_range("holidays", "2025-09-06 10:00").is_err());
        assert!(parse_range("holidays", "2025-09-07→2025-09-06 10:00").is_err());
    }

    #[test]
    fn test_windows() {
        let w = parse_window("setupWindow", "06:00-22:00").unwrap();
        assert_eq!(w, DailyWindow::default());
        assert!(parse_window("setupWindow", "22:00-06:00").is_err());
        assert!(parse_window("setupWindow", "all day").is_err());

        assert_eq!(
            parse_production_window("productionWindow", "24x7").unwrap(),
            ProductionWindow::AlwaysOpen
        );
        assert_eq!(
            parse_production_window("productionWindow", "06:00-22:00").unwrap(),
            ProductionWindow::Daily(DailyWindow::default())
        );
    }
}
