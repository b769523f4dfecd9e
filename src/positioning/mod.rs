/// 实时定位流水线
///
/// 数据流：
/// 读数 -> IngestRouter -> SignalSmoother（每流）-> TagStateStore（最新平滑值）
///      -> Scheduler（周期）-> PositionSolver -> TagStateStore（位置）-> 外部消费者
///
/// 接入和计算真正并行：接入按流加锁，调度按标签读写。

pub mod router;
pub mod scheduler;
pub mod store;

pub use router::*;
pub use scheduler::*;
pub use store::*;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::algorithms::{
    AnchorSet, DistanceModel, LogDistanceModel, PositionFix, PositionSolver,
};
use crate::config::PositioningConfig;
use crate::error::{ConfigError, IngestError, MessageError};
use crate::message::ReadingDecoder;

/// 接入循环的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// 定位系统 - 组装路由、存储和调度器
pub struct PositioningSystem {
    anchors: Arc<AnchorSet>,
    store: Arc<TagStateStore>,
    router: IngestRouter,
    scheduler: Scheduler,
    decoder: ReadingDecoder,
}

impl PositioningSystem {
    /// 按配置构建，使用对数距离模型和配置中的求解器
    pub fn from_config(config: &PositioningConfig) -> Result<Self, ConfigError> {
        Self::with_strategies(config, Arc::new(LogDistanceModel), Arc::from(config.solver.build()))
    }

    /// 按配置构建，并指定距离模型和求解器
    pub fn with_strategies(
        config: &PositioningConfig,
        model: Arc<dyn DistanceModel>,
        solver: Arc<dyn PositionSolver>,
    ) -> Result<Self, ConfigError> {
        // 配置可能是手工构造的，构建前再规范化并校验一次
        let mut config = config.clone();
        config.normalize();
        config.validate()?;

        let anchors = Arc::new(
            AnchorSet::from_vec(config.anchors.clone())
                .map_err(|id| ConfigError::InvalidAnchor(format!("锚点 ID 重复: {}", id)))?,
        );
        let store = Arc::new(TagStateStore::new(config.tags.iter().cloned()));

        let router = IngestRouter::new(
            Arc::clone(&anchors),
            Arc::clone(&store),
            RouterSettings {
                smoother: config.smoother,
                history_capacity: config.history_capacity,
                reorder_tolerance: config.reorder_tolerance(),
            },
        );

        info!(
            anchors = anchors.len(),
            tags = store.len(),
            model = model.name(),
            solver = solver.name(),
            "定位系统已初始化"
        );

        let scheduler = Scheduler::new(
            Arc::clone(&anchors),
            Arc::clone(&store),
            model,
            solver,
            SchedulerSettings {
                period: config.tick_interval(),
                staleness: config.staleness(),
            },
        );

        Ok(PositioningSystem {
            anchors,
            store,
            router,
            scheduler,
            decoder: ReadingDecoder::new(config.topics),
        })
    }

    /// 接入一条读数
    pub fn ingest(&self, reading: RawReading) -> Result<(), IngestError> {
        self.router.ingest(reading)
    }

    /// 解码并接入一条入站消息
    pub fn ingest_message(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<(), MessageError> {
        let reading = self.decoder.decode(topic, payload, received_at)?;
        self.router.ingest(reading)?;
        Ok(())
    }

    /// 执行一次调度
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        self.scheduler.tick(now)
    }

    /// 周期调度直到停止信号
    pub async fn run_scheduler(&self, shutdown: watch::Receiver<bool>) -> u64 {
        self.scheduler.run(shutdown).await
    }

    /// 从通道持续接入读数，直到通道关闭或收到停止信号
    ///
    /// 被拒绝的读数已由路由记录日志，这里只计数。
    pub async fn run_ingest(
        &self,
        mut readings: mpsc::Receiver<RawReading>,
        mut shutdown: watch::Receiver<bool>,
    ) -> IngestStats {
        let mut stats = IngestStats::default();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                reading = readings.recv() => {
                    let Some(reading) = reading else {
                        debug!("读数通道关闭");
                        break;
                    };
                    match self.router.ingest(reading) {
                        Ok(()) => stats.accepted += 1,
                        Err(_) => stats.rejected += 1,
                    }
                }
            }
        }

        stats
    }

    /// 全部标签记录的快照
    pub fn snapshot(&self) -> HashMap<String, TagRecord> {
        self.store.snapshot()
    }

    /// 对外的位置输出
    pub fn position_feed(&self) -> HashMap<String, PositionFix> {
        self.store.position_feed()
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn store(&self) -> &Arc<TagStateStore> {
        &self.store
    }

    pub fn router(&self) -> &IngestRouter {
        &self.router
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PositioningConfig;

    fn config() -> PositioningConfig {
        PositioningConfig::from_json_str(
            r#"{
                "anchors": [
                    {"id": "R1", "x": 0.0, "y": 0.0, "calibrated_rssi_at_1m": -59.0, "path_loss_exponent": 1.8},
                    {"id": "R2", "x": 9.0, "y": 0.0, "calibrated_rssi_at_1m": -59.0, "path_loss_exponent": 1.8},
                    {"id": "R3", "x": 4.0, "y": 2.5, "calibrated_rssi_at_1m": -90.0, "path_loss_exponent": 1.8}
                ],
                "tags": ["T1"],
                "smoother": {"process_noise": 0.008, "measurement_noise": 4.0},
                "staleness_ms": 10000,
                "topics": {"rx1": "R1", "rx2": "R2", "rx3": "R3"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_messages_flow_to_position() {
        let system = PositioningSystem::from_config(&config()).unwrap();
        let now = Utc::now();
        for (topic, rssi) in [("rx1", -55), ("rx2", -60), ("rx3", -70)] {
            let payload = format!(r#"[{{"mac": "t1", "rssi": {}}}]"#, rssi);
            system.ingest_message(topic, payload.as_bytes(), now).unwrap();
        }

        let report = system.tick(now);
        assert!(report.published_for("T1").is_some());
        assert!(system.position_feed().contains_key("T1"));
    }

    #[test]
    fn test_message_errors_are_typed() {
        let system = PositioningSystem::from_config(&config()).unwrap();
        let now = Utc::now();
        assert!(matches!(
            system.ingest_message("rx9", b"[]", now),
            Err(MessageError::Decode(_))
        ));
        assert!(matches!(
            system.ingest_message("rx1", br#"[{"mac": "T2", "rssi": -50}]"#, now),
            Err(MessageError::Ingest(IngestError::UnknownTag(_)))
        ));
    }

    #[test]
    fn test_rejects_invalid_manual_config() {
        let mut config = config();
        config.anchors[2].y = 0.0;
        assert!(matches!(
            PositioningSystem::from_config(&config),
            Err(ConfigError::DegenerateAnchors(_))
        ));
    }

    #[test]
    fn test_manual_config_tags_normalized() {
        let mut config = config();
        config.tags = vec!["t1".to_string()];
        let system = PositioningSystem::from_config(&config).unwrap();
        let now = Utc::now();

        assert_eq!(system.store().tag_ids().collect::<Vec<_>>(), vec!["T1"]);
        system
            .ingest_message("rx1", br#"[{"mac": "t1", "rssi": -50}]"#, now)
            .unwrap();
        system.ingest(RawReading::new("t1", "R2", -60.0, now)).unwrap();
        assert_eq!(system.store().latest_smoothed("T1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_ingest_counts() {
        let system = PositioningSystem::from_config(&config()).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let now = Utc::now();

        tx.send(RawReading::new("T1", "R1", -55.0, now)).await.unwrap();
        tx.send(RawReading::new("T9", "R1", -55.0, now)).await.unwrap();
        drop(tx);

        let stats = system.run_ingest(rx, stop_rx).await;
        assert_eq!(stats, IngestStats { accepted: 1, rejected: 1 });
    }
}
