/// 读数接入路由
///
/// 校验每条原始读数并路由到对应 (标签, 接收器) 流：
/// - 追加到该流的有界历史（满时淘汰最旧）
/// - 交给该流独占的平滑滤波器更新状态
/// - 将最新平滑状态发布到标签状态存储
///
/// 每个流一把锁：同一流的更新串行，不同流之间完全并行。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::algorithms::{AnchorSet, SignalSmoother, SmoothState, SmootherSettings};
use crate::error::{IngestError, MalformedReading};
use crate::message::normalize_tag_id;
use crate::positioning::TagStateStore;

/// 原始 RSSI 读数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub tag_id: String,
    pub receiver_id: String,
    /// 信号强度 (dBm)
    pub rssi: f64,
    pub observed_at: DateTime<Utc>,
}

impl RawReading {
    pub fn new(
        tag_id: impl Into<String>,
        receiver_id: impl Into<String>,
        rssi: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        RawReading {
            tag_id: tag_id.into(),
            receiver_id: receiver_id.into(),
            rssi,
            observed_at,
        }
    }
}

/// 流标识 (标签, 接收器)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub tag_id: String,
    pub receiver_id: String,
}

impl StreamKey {
    pub fn new(tag_id: impl Into<String>, receiver_id: impl Into<String>) -> Self {
        StreamKey {
            tag_id: tag_id.into(),
            receiver_id: receiver_id.into(),
        }
    }
}

/// 固定容量的环形历史，只用于诊断和绘图
#[derive(Clone, Debug)]
pub struct BoundedHistory {
    readings: VecDeque<RawReading>,
    capacity: usize,
}

impl BoundedHistory {
    /// 创建历史缓冲，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BoundedHistory {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 追加读数，满时淘汰最旧的一条
    pub fn push(&mut self, reading: RawReading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// 最新一条读数
    pub fn latest(&self) -> Option<&RawReading> {
        self.readings.back()
    }

    /// 按时间从旧到新迭代
    pub fn iter(&self) -> impl Iterator<Item = &RawReading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// 单个流的独占状态
struct Stream {
    smoother: SignalSmoother,
    history: BoundedHistory,
    last_accepted: Option<DateTime<Utc>>,
}

/// 路由参数
#[derive(Clone, Copy, Debug)]
pub struct RouterSettings {
    pub smoother: SmootherSettings,
    /// 每流历史容量
    pub history_capacity: usize,
    /// 允许的乱序容差
    pub reorder_tolerance: chrono::Duration,
}

/// 读数接入路由器
pub struct IngestRouter {
    anchors: Arc<AnchorSet>,
    store: Arc<TagStateStore>,
    settings: RouterSettings,
    /// 标签和接收器集合都是静态的，流表在构建时一次建好，之后只读
    streams: HashMap<StreamKey, Mutex<Stream>>,
}

impl IngestRouter {
    /// 为注册表中每个 (标签, 接收器) 组合建立流槽位
    pub fn new(anchors: Arc<AnchorSet>, store: Arc<TagStateStore>, settings: RouterSettings) -> Self {
        let mut streams = HashMap::new();
        for tag_id in store.tag_ids() {
            for receiver_id in anchors.ids() {
                streams.insert(
                    StreamKey::new(tag_id, receiver_id),
                    Mutex::new(Stream {
                        smoother: SignalSmoother::new(settings.smoother),
                        history: BoundedHistory::new(settings.history_capacity),
                        last_accepted: None,
                    }),
                );
            }
        }

        IngestRouter {
            anchors,
            store,
            settings,
            streams,
        }
    }

    /// 接入一条读数
    ///
    /// 被拒绝的读数记录日志后丢弃，不影响该流后续的有效读数。
    pub fn ingest(&self, reading: RawReading) -> Result<(), IngestError> {
        self.route(reading).inspect_err(|e| {
            warn!(error = %e, "丢弃读数");
        })
    }

    fn route(&self, mut reading: RawReading) -> Result<(), IngestError> {
        // 注册表中的标签 ID 已规范化，这里按同一规则处理
        reading.tag_id = normalize_tag_id(&reading.tag_id);
        if !self.store.contains(&reading.tag_id) {
            return Err(IngestError::UnknownTag(reading.tag_id));
        }
        if !self.anchors.contains(&reading.receiver_id) {
            return Err(IngestError::UnknownReceiver(reading.receiver_id));
        }
        if !reading.rssi.is_finite() {
            return Err(MalformedReading::NonFiniteRssi(reading.rssi).into());
        }

        let key = StreamKey::new(reading.tag_id.as_str(), reading.receiver_id.as_str());
        let Some(slot) = self.streams.get(&key) else {
            return Err(IngestError::UnknownReceiver(reading.receiver_id));
        };

        // 流状态在每一步之后都保持一致，中毒的锁可以直接恢复
        let mut stream = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let dt = match stream.last_accepted {
            Some(last) => {
                // 容差大到超出时间范围时不再判定乱序
                let earliest = last.checked_sub_signed(self.settings.reorder_tolerance);
                if earliest.is_some_and(|earliest| reading.observed_at < earliest) {
                    return Err(MalformedReading::OutOfOrder {
                        observed_at: reading.observed_at,
                        last_accepted: last,
                    }
                    .into());
                }
                (reading.observed_at - last).to_std().unwrap_or(Duration::ZERO)
            }
            None => Duration::ZERO,
        };

        let state = stream
            .smoother
            .update(reading.rssi, dt, reading.observed_at);
        stream.last_accepted = Some(state.last_update);

        debug!(
            tag = %reading.tag_id,
            receiver = %reading.receiver_id,
            rssi = reading.rssi,
            filtered = state.estimate,
            "读数已接入"
        );

        // 持锁发布，保证存储中的状态顺序与滤波顺序一致
        self.store
            .update_smoothed(&reading.tag_id, &reading.receiver_id, state);
        stream.history.push(reading);

        Ok(())
    }

    /// 某个流的当前平滑状态
    pub fn smooth_state(&self, tag_id: &str, receiver_id: &str) -> Option<SmoothState> {
        let slot = self
            .streams
            .get(&StreamKey::new(normalize_tag_id(tag_id), receiver_id))?;
        let stream = slot.lock().unwrap_or_else(PoisonError::into_inner);
        stream.smoother.state()
    }

    /// 某个流的历史读数（从旧到新）
    pub fn history(&self, tag_id: &str, receiver_id: &str) -> Option<Vec<RawReading>> {
        let slot = self
            .streams
            .get(&StreamKey::new(normalize_tag_id(tag_id), receiver_id))?;
        let stream = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(stream.history.iter().cloned().collect())
    }
}
