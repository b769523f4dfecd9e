/// 接收器锚点定义和相关数据结构

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::algorithms::Position;

/// 单个接收器锚点（坐标已知的固定接收器）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiverAnchor {
    /// 接收器唯一标识符
    pub id: String,
    /// X 坐标（与距离同一单位）
    pub x: f64,
    /// Y 坐标
    pub y: f64,
    /// 1 米处的校准 RSSI (dBm)
    pub calibrated_rssi_at_1m: f64,
    /// 路径损耗指数 n
    pub path_loss_exponent: f64,
}

impl ReceiverAnchor {
    /// 创建新的锚点
    pub fn new(
        id: impl Into<String>,
        x: f64,
        y: f64,
        calibrated_rssi_at_1m: f64,
        path_loss_exponent: f64,
    ) -> Self {
        ReceiverAnchor {
            id: id.into(),
            x,
            y,
            calibrated_rssi_at_1m,
            path_loss_exponent,
        }
    }

    /// 获取锚点的 2D 坐标
    pub fn coordinates(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// 计算到某个位置的欧几里得距离
    pub fn distance_to(&self, position: &Position) -> f64 {
        let dx = self.x - position.x;
        let dy = self.y - position.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// 检查锚点参数的合理性
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("锚点 ID 不能为空".to_string());
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(format!("锚点 {} 坐标必须为有限值", self.id));
        }
        if !self.calibrated_rssi_at_1m.is_finite() {
            return Err(format!("锚点 {} 的校准 RSSI 必须为有限值", self.id));
        }
        if !(self.path_loss_exponent.is_finite() && self.path_loss_exponent > 0.0) {
            return Err(format!(
                "锚点 {} 的路径损耗指数必须为正数, 实际 {}",
                self.id, self.path_loss_exponent
            ));
        }
        Ok(())
    }
}

/// 锚点集合 - 启动时构建，进程生命周期内不可变
///
/// 保留配置顺序：求解器以第一个锚点为参考圆。
#[derive(Clone, Debug, Default)]
pub struct AnchorSet {
    anchors: Vec<ReceiverAnchor>,
    /// 锚点 ID -> 在 `anchors` 中的下标
    index: HashMap<String, usize>,
}

impl AnchorSet {
    /// 从锚点向量创建集合，ID 重复时返回重复的 ID
    pub fn from_vec(anchors: Vec<ReceiverAnchor>) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(anchors.len());
        for (i, anchor) in anchors.iter().enumerate() {
            if index.insert(anchor.id.clone(), i).is_some() {
                return Err(anchor.id.clone());
            }
        }
        Ok(AnchorSet { anchors, index })
    }

    /// 获取锚点
    pub fn get(&self, id: &str) -> Option<&ReceiverAnchor> {
        self.index.get(id).map(|&i| &self.anchors[i])
    }

    /// 是否包含锚点
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// 按配置顺序获取所有锚点
    pub fn all(&self) -> &[ReceiverAnchor] {
        &self.anchors
    }

    /// 按配置顺序迭代锚点 ID
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.anchors.iter().map(|a| a.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
