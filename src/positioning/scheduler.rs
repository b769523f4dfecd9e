/// 周期定位调度
///
/// 固定间隔触发：对注册表中每个标签读取各接收器的最新平滑 RSSI，
/// 换算距离后三边定位，成功则写回存储。
/// - 任一接收器缺失或数据过期：跳过该标签，不发布降级结果
/// - 求解失败：记录日志，保留上一次的位置

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::algorithms::{
    AnchorSet, DistanceModel, PositionFix, PositionSolver, residual_error,
};
use crate::error::SolveError;
use crate::positioning::TagStateStore;

/// 跳过某标签的原因（正常情况，不是错误）
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// 该接收器从未收到此标签的读数
    MissingReceiver(String),
    /// 该接收器的数据超过过期阈值
    Stale {
        receiver_id: String,
        age: chrono::Duration,
    },
}

/// 单次调度的结果汇总
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    pub published: Vec<(String, PositionFix)>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failed: Vec<(String, SolveError)>,
}

impl TickReport {
    /// 某标签本次是否发布了位置
    pub fn published_for(&self, tag_id: &str) -> Option<&PositionFix> {
        self.published
            .iter()
            .find(|(id, _)| id == tag_id)
            .map(|(_, fix)| fix)
    }

    /// 某标签本次是否被跳过
    pub fn skipped_for(&self, tag_id: &str) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|(id, _)| id == tag_id)
            .map(|(_, reason)| reason)
    }
}

/// 调度参数
#[derive(Clone, Copy, Debug)]
pub struct SchedulerSettings {
    /// 调度周期
    pub period: Duration,
    /// 数据过期阈值
    pub staleness: chrono::Duration,
}

/// 定位调度器
pub struct Scheduler {
    anchors: Arc<AnchorSet>,
    store: Arc<TagStateStore>,
    model: Arc<dyn DistanceModel>,
    solver: Arc<dyn PositionSolver>,
    settings: SchedulerSettings,
    /// 排序后的标签列表，保证每次调度顺序一致
    tags: Vec<String>,
}

impl Scheduler {
    pub fn new(
        anchors: Arc<AnchorSet>,
        store: Arc<TagStateStore>,
        model: Arc<dyn DistanceModel>,
        solver: Arc<dyn PositionSolver>,
        settings: SchedulerSettings,
    ) -> Self {
        let mut tags: Vec<String> = store.tag_ids().map(str::to_string).collect();
        tags.sort();

        Scheduler {
            anchors,
            store,
            model,
            solver,
            settings,
            tags,
        }
    }

    /// 执行一次调度
    ///
    /// 纯计算，不挂起；一个标签的失败不影响其他标签。
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for tag_id in &self.tags {
            match self.locate(tag_id, now) {
                Ok(Ok(fix)) => {
                    info!(tag = %tag_id, position = %fix.position, residual = fix.residual, "位置已更新");
                    self.store.record_fix(tag_id, fix.clone());
                    report.published.push((tag_id.clone(), fix));
                }
                Ok(Err(e)) => {
                    warn!(tag = %tag_id, error = %e, solver = self.solver.name(), "定位求解失败，保留上一次位置");
                    report.failed.push((tag_id.clone(), e));
                }
                Err(reason) => {
                    debug!(tag = %tag_id, ?reason, "数据不足，跳过");
                    report.skipped.push((tag_id.clone(), reason));
                }
            }
        }

        report
    }

    fn locate(
        &self,
        tag_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Result<PositionFix, SolveError>, SkipReason> {
        let smoothed = self.store.latest_smoothed(tag_id).unwrap_or_default();

        let mut distances = Vec::with_capacity(self.anchors.len());
        for anchor in self.anchors.all() {
            let Some(state) = smoothed.get(&anchor.id) else {
                return Err(SkipReason::MissingReceiver(anchor.id.clone()));
            };
            let age = state.age(now);
            if age > self.settings.staleness {
                return Err(SkipReason::Stale {
                    receiver_id: anchor.id.clone(),
                    age,
                });
            }
            distances.push(self.model.rssi_to_distance(state.estimate, anchor));
        }

        let anchors = self.anchors.all();
        Ok(self.solver.solve(anchors, &distances).map(|position| {
            let residual = residual_error(anchors, &distances, &position);
            PositionFix::new(position, now).with_diagnostics(residual, distances)
        }))
    }

    /// 周期运行直到收到停止信号
    ///
    /// 停止信号只在两次调度之间检查，进行中的调度总会完整执行。
    /// 返回执行过的调度次数。
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut interval = tokio::time::interval(self.settings.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut ticks = 0;

        info!(
            period_ms = self.settings.period.as_millis() as u64,
            tags = self.tags.len(),
            "定位调度启动"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let report = self.tick(Utc::now());
                    ticks += 1;
                    debug!(
                        tick = ticks,
                        published = report.published.len(),
                        skipped = report.skipped.len(),
                        failed = report.failed.len(),
                        "调度完成"
                    );
                }
            }
        }

        info!(ticks, "定位调度已停止");
        ticks
    }
}
