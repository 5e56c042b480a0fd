//! 时间戳编码约定
//!
//! 负载中的时间戳一律序列化为带 UTC 偏移的 ISO-8601 字符串（秒精度），
//! 与后端回退的 `to_timestamp` 解析格式保持一致。
//! 事件/聚合的时间字段可通过 `#[serde(with = "chronicle_domain::time::iso_utc")]` 接入。
//!
use chrono::{DateTime, SecondsFormat, Utc};

/// 编码为 `2024-01-02T03:04:05+00:00` 形态
pub fn to_iso_utc(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// 解析 ISO-8601（接受任意偏移，归一化为 UTC）
pub fn parse_iso_utc(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `#[serde(with = ...)]` 适配模块
pub mod iso_utc {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::to_iso_utc(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso_utc(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid ISO-8601 timestamp: {raw}")))
    }
}
