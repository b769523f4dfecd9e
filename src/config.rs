/// 定位系统配置
///
/// 启动时从 JSON 文件加载一次，校验通过后才用于构建流水线。
/// 过程噪声、测量噪声和过期阈值没有内置默认值，必须显式给出。

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::algorithms::{ReceiverAnchor, SmootherSettings, SolverKind, validate_geometry};
use crate::error::ConfigError;
use crate::message::normalize_tag_id;

/// 默认调度周期（毫秒）
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 4000;

/// 默认每流历史容量
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// 过期阈值和乱序容差的上限（毫秒），一天
pub const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// 定位系统配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositioningConfig {
    /// 接收器锚点（顺序即求解顺序）
    pub anchors: Vec<ReceiverAnchor>,
    /// 静态标签注册表
    pub tags: Vec<String>,
    /// 平滑滤波参数
    pub smoother: SmootherSettings,
    /// 数据过期阈值（毫秒）
    pub staleness_ms: u64,
    /// 调度周期（毫秒）
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// 每流历史容量
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// 乱序容差（毫秒）
    #[serde(default)]
    pub reorder_tolerance_ms: u64,
    /// 主题 -> 接收器 ID
    #[serde(default)]
    pub topics: HashMap<String, String>,
    /// 求解器类型
    #[serde(default)]
    pub solver: SolverKind,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl PositioningConfig {
    /// 从 JSON 文件加载并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path_str,
            message: e.to_string(),
        })?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 字符串加载并校验
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: PositioningConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// 序列化为格式化的 JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 规范化标签 ID
    pub fn normalize(&mut self) {
        for tag in &mut self.tags {
            *tag = normalize_tag_id(tag);
        }
    }

    /// 校验全部参数，锚点共线时快速失败
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut anchor_ids = HashSet::new();
        for anchor in &self.anchors {
            anchor.validate().map_err(ConfigError::InvalidAnchor)?;
            if !anchor_ids.insert(anchor.id.as_str()) {
                return Err(ConfigError::InvalidAnchor(format!(
                    "锚点 ID 重复: {}",
                    anchor.id
                )));
            }
        }
        validate_geometry(&self.anchors).map_err(ConfigError::DegenerateAnchors)?;

        if self.tags.is_empty() {
            return Err(invalid("tags", "至少需要一个标签"));
        }
        let mut tag_ids = HashSet::new();
        for tag in &self.tags {
            if tag.is_empty() {
                return Err(invalid("tags", "标签 ID 不能为空"));
            }
            if !tag_ids.insert(tag.as_str()) {
                return Err(invalid("tags", format!("标签 ID 重复: {}", tag)));
            }
        }

        self.smoother
            .validate()
            .map_err(|reason| invalid("smoother", reason))?;

        if self.staleness_ms == 0 {
            return Err(invalid("staleness_ms", "必须大于 0"));
        }
        if self.staleness_ms > MAX_WINDOW_MS {
            return Err(invalid("staleness_ms", format!("不能超过 {} 毫秒", MAX_WINDOW_MS)));
        }
        if self.reorder_tolerance_ms > MAX_WINDOW_MS {
            return Err(invalid(
                "reorder_tolerance_ms",
                format!("不能超过 {} 毫秒", MAX_WINDOW_MS),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms", "必须大于 0"));
        }
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity", "必须大于 0"));
        }

        for (topic, receiver) in &self.topics {
            if !anchor_ids.contains(receiver.as_str()) {
                return Err(invalid(
                    "topics",
                    format!("主题 {} 映射到未配置的接收器 {}", topic, receiver),
                ));
            }
        }

        Ok(())
    }

    pub fn staleness(&self) -> chrono::Duration {
        window(self.staleness_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn reorder_tolerance(&self) -> chrono::Duration {
        window(self.reorder_tolerance_ms)
    }
}

/// 校验保证不超过上限；手工构造未校验的配置时按上限截断
fn window(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(ms.min(MAX_WINDOW_MS) as i64)
}

fn invalid(parameter: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        reason: reason.into(),
    }
}
