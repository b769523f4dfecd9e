/// 标签状态存储
///
/// 每个标签一条记录：各接收器的最新平滑状态 + 最近一次定位结果。
/// 标签集合在配置时确定，外层映射构建后只读；每条记录独立加锁，
/// 一个标签的写入不会阻塞或影响其他标签。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::algorithms::{Position, PositionFix, SmoothState};

/// 单个标签的记录
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TagRecord {
    pub tag_id: String,
    /// 接收器 ID -> 最新平滑状态
    pub per_receiver: HashMap<String, SmoothState>,
    /// 位置和时间戳一起替换
    pub last_position: Option<PositionFix>,
}

impl TagRecord {
    fn new(tag_id: String) -> Self {
        TagRecord {
            tag_id,
            per_receiver: HashMap::new(),
            last_position: None,
        }
    }

    /// 最近一次定位的位置
    pub fn last_position(&self) -> Option<Position> {
        self.last_position.as_ref().map(|fix| fix.position)
    }

    /// 最近一次定位的时间
    pub fn last_position_at(&self) -> Option<DateTime<Utc>> {
        self.last_position.as_ref().map(|fix| fix.computed_at)
    }
}

/// 标签状态存储
#[derive(Debug)]
pub struct TagStateStore {
    records: HashMap<String, RwLock<TagRecord>>,
}

impl TagStateStore {
    /// 从静态标签注册表创建
    pub fn new(tag_ids: impl IntoIterator<Item = String>) -> Self {
        let records = tag_ids
            .into_iter()
            .map(|id| (id.clone(), RwLock::new(TagRecord::new(id))))
            .collect();
        TagStateStore { records }
    }

    /// 是否为已注册标签
    pub fn contains(&self, tag_id: &str) -> bool {
        self.records.contains_key(tag_id)
    }

    /// 已注册的标签 ID（无序）
    pub fn tag_ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 写入某个流的最新平滑状态，未注册标签返回 false
    pub fn update_smoothed(&self, tag_id: &str, receiver_id: &str, state: SmoothState) -> bool {
        let Some(record) = self.records.get(tag_id) else {
            return false;
        };
        let mut record = record.write().unwrap_or_else(PoisonError::into_inner);
        record.per_receiver.insert(receiver_id.to_string(), state);
        true
    }

    /// 某标签各接收器的最新平滑状态
    pub fn latest_smoothed(&self, tag_id: &str) -> Option<HashMap<String, SmoothState>> {
        let record = self.records.get(tag_id)?;
        let record = record.read().unwrap_or_else(PoisonError::into_inner);
        Some(record.per_receiver.clone())
    }

    /// 发布定位结果，未注册标签返回 false
    pub fn record_position(&self, tag_id: &str, position: Position, at: DateTime<Utc>) -> bool {
        self.record_fix(tag_id, PositionFix::new(position, at))
    }

    /// 发布带诊断信息的定位结果（整体替换）
    pub fn record_fix(&self, tag_id: &str, fix: PositionFix) -> bool {
        let Some(record) = self.records.get(tag_id) else {
            return false;
        };
        let mut record = record.write().unwrap_or_else(PoisonError::into_inner);
        record.last_position = Some(fix);
        true
    }

    /// 某标签最近一次定位结果
    pub fn position(&self, tag_id: &str) -> Option<PositionFix> {
        let record = self.records.get(tag_id)?;
        let record = record.read().unwrap_or_else(PoisonError::into_inner);
        record.last_position.clone()
    }

    /// 全部标签记录的只读快照
    ///
    /// 每条记录在各自的读锁下整体复制，不会出现撕裂的记录。
    pub fn snapshot(&self) -> HashMap<String, TagRecord> {
        self.records
            .iter()
            .map(|(id, record)| {
                let record = record.read().unwrap_or_else(PoisonError::into_inner);
                (id.clone(), record.clone())
            })
            .collect()
    }

    /// 对外的位置输出：只包含已有定位的标签
    pub fn position_feed(&self) -> HashMap<String, PositionFix> {
        self.records
            .iter()
            .filter_map(|(id, record)| {
                let record = record.read().unwrap_or_else(PoisonError::into_inner);
                record.last_position.clone().map(|fix| (id.clone(), fix))
            })
            .collect()
    }
}
