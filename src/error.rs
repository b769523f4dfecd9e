/// 错误类型定义
///
/// 按关注点划分：
/// - 读数接入错误（未知标签/接收器、畸形读数）：丢弃并记录，不致命
/// - 几何求解错误（锚点共线等）：启动时致命，运行时保留上一次结果
/// - 配置错误：唯一允许终止进程的错误
/// - 消息解码错误：在边界处拒绝，不进入路由

use chrono::{DateTime, Utc};
use thiserror::Error;

/// 读数接入错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("未注册的标签: {0}")]
    UnknownTag(String),

    #[error("未配置的接收器: {0}")]
    UnknownReceiver(String),

    #[error("畸形读数: {0}")]
    Malformed(#[from] MalformedReading),
}

/// 格式正确但语义无效的读数
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedReading {
    #[error("RSSI 不是有限值: {0}")]
    NonFiniteRssi(f64),

    /// 早于该流上次接受时间减去容差的读数，直接丢弃而不重排
    #[error("乱序读数: 观测时间 {observed_at} 早于上次接受的 {last_accepted}")]
    OutOfOrder {
        observed_at: DateTime<Utc>,
        last_accepted: DateTime<Utc>,
    },
}

/// 定位求解错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// 锚点共线，系数矩阵奇异
    #[error("锚点几何退化 (行列式 {determinant:.3e})")]
    Degenerate { determinant: f64 },

    #[error("锚点不足: 需要 {required} 个, 实际 {available} 个")]
    InsufficientAnchors { required: usize, available: usize },

    #[error("锚点数 {anchors} 与距离数 {distances} 不一致")]
    MismatchedInput { anchors: usize, distances: usize },

    /// 输入距离或解算结果不是有限值（例如极弱信号换算出的无穷远距离）
    #[error("求解结果不是有限值")]
    NonFinite,
}

/// 配置错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("读取配置文件 '{path}' 失败: {message}")]
    Io { path: String, message: String },

    #[error("解析配置失败: {0}")]
    Parse(String),

    #[error("参数 {parameter} 无效: {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("锚点配置无效: {0}")]
    InvalidAnchor(String),

    #[error("锚点布局不可用: {0}")]
    DegenerateAnchors(#[source] SolveError),
}

/// 入站消息解码错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("未映射到接收器的主题: {0}")]
    UnknownTopic(String),

    #[error("消息不是合法 JSON: {0}")]
    InvalidJson(String),

    #[error("消息中没有包含 rssi 的条目")]
    NoRssiEntry,

    #[error("缺少字段: {0}")]
    MissingField(&'static str),

    #[error("字段 {field} 无效: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// 入站消息处理错误（解码或接入任一阶段）
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessageError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}
