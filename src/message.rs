/// 入站消息解码
///
/// 接收器按主题发布扫描结果，消息体为 JSON 数组（或单个对象），例如：
///
/// ```json
/// [{"timestamp": "2024-05-01T12:00:00.125Z", "mac": "C3:00:00:35:83:F6", "rssi": -61}]
/// ```
///
/// 解码器在边界处把消息转换为 `RawReading`；格式错误的消息在这里被拒绝，
/// 不会进入路由。

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

use crate::error::DecodeError;
use crate::positioning::RawReading;

/// MAC 地址中常见的分隔符
static TAG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[:\-\s]").expect("分隔符正则合法"));

/// 支持的无时区时间格式（按 UTC 解释）
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// 标签 ID 规范化：转大写并去掉分隔符
///
/// `c3:00:00:35:83:f6` 与 `C300003583F6` 视为同一标签。
pub fn normalize_tag_id(raw: &str) -> String {
    TAG_SEPARATORS.replace_all(raw.trim(), "").to_uppercase()
}

/// 解析时间戳字符串
///
/// 支持 `YYYY-MM-DD HH:MM:SS`、带 `T` 分隔的 ISO-8601（可带小数秒），
/// 以及末尾带 `Z` 或显式时区偏移的形式。
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// 消息解码器 - 主题到接收器的映射
#[derive(Clone, Debug, Default)]
pub struct ReadingDecoder {
    topics: HashMap<String, String>,
}

impl ReadingDecoder {
    /// 创建解码器，`topics` 为 主题 -> 接收器 ID
    pub fn new(topics: HashMap<String, String>) -> Self {
        let topics = topics
            .into_iter()
            .map(|(topic, receiver)| (topic.trim().to_string(), receiver))
            .collect();
        ReadingDecoder { topics }
    }

    /// 查找主题对应的接收器
    pub fn receiver_for(&self, topic: &str) -> Option<&str> {
        self.topics.get(topic.trim()).map(String::as_str)
    }

    /// 解码一条消息
    ///
    /// `received_at` 用于消息缺少时间戳或时间戳无法解析的情况。
    pub fn decode(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<RawReading, DecodeError> {
        let receiver_id = self
            .receiver_for(topic)
            .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;

        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

        let entry = select_entry(&value).ok_or(DecodeError::NoRssiEntry)?;

        let mac = entry
            .get("mac")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField("mac"))?;
        let tag_id = normalize_tag_id(mac);
        if tag_id.is_empty() {
            return Err(DecodeError::InvalidField {
                field: "mac",
                reason: "标签地址为空".to_string(),
            });
        }

        let rssi = entry
            .get("rssi")
            .and_then(Value::as_f64)
            .ok_or_else(|| DecodeError::InvalidField {
                field: "rssi",
                reason: format!("不是数值: {}", entry["rssi"]),
            })?;

        let observed_at = match entry
            .get("time")
            .or_else(|| entry.get("timestamp"))
            .and_then(Value::as_str)
        {
            Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
                warn!(timestamp = raw, "无法解析时间戳，使用接收时间");
                received_at
            }),
            None => received_at,
        };

        Ok(RawReading::new(tag_id, receiver_id, rssi, observed_at))
    }
}

/// 选出第一个包含 rssi 字段的条目
fn select_entry(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .find(|item| item.contains_key("rssi")),
        Value::Object(item) if item.contains_key("rssi") => Some(item),
        _ => None,
    }
}
