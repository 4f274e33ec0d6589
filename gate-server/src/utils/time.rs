//! 时间工具函数 — 业务时区转换
//!
//! 所有时间戳→显示字符串的转换统一在 API/重建层完成，
//! 存储层只持有 `i64` Unix millis。

use chrono::TimeZone;
use chrono_tz::Tz;

/// Unix millis → RFC-3339 字符串 (业务时区)
///
/// 无效时间戳 fallback 到毫秒数字字符串，不让一条坏记录拖垮整页历史。
pub fn millis_to_rfc3339(millis: i64, tz: Tz) -> String {
    match tz.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.to_rfc3339(),
        None => millis.to_string(),
    }
}

/// 解析业务时区字符串 (IANA 名称)，失败 fallback 到 Asia/Kolkata
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!(
            "Failed to parse timezone '{}', falling back to Asia/Kolkata",
            name
        );
        chrono_tz::Asia::Kolkata
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_rfc3339_kolkata_offset() {
        // 2024-01-01 00:00:00 UTC == 05:30 IST
        let s = millis_to_rfc3339(1_704_067_200_000, chrono_tz::Asia::Kolkata);
        assert!(s.starts_with("2024-01-01T05:30:00"));
        assert!(s.ends_with("+05:30"));
    }

    #[test]
    fn test_parse_timezone_fallback() {
        assert_eq!(parse_timezone("Asia/Kolkata"), chrono_tz::Asia::Kolkata);
        assert_eq!(parse_timezone("Not/AZone"), chrono_tz::Asia::Kolkata);
    }
}
