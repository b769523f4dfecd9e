/// RSSI 信号平滑
///
/// 每个 (标签, 接收器) 流一个独立的一维卡尔曼滤波器：
/// - 预测：不确定度按过程噪声 × 时间间隔增长
/// - 更新：按各自不确定度的倒数加权融合新测量，不确定度收缩

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 滤波器参数（无隐式默认值，必须显式配置）
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmootherSettings {
    /// 过程噪声方差（每秒）
    pub process_noise: f64,
    /// 测量噪声方差
    pub measurement_noise: f64,
}

impl SmootherSettings {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        SmootherSettings {
            process_noise,
            measurement_noise,
        }
    }

    /// 验证参数合理性
    pub fn validate(&self) -> Result<(), String> {
        if !(self.process_noise.is_finite() && self.process_noise >= 0.0) {
            return Err(format!("过程噪声必须为非负有限值, 实际 {}", self.process_noise));
        }
        if !(self.measurement_noise.is_finite() && self.measurement_noise > 0.0) {
            return Err(format!(
                "测量噪声必须为正的有限值, 实际 {}",
                self.measurement_noise
            ));
        }
        Ok(())
    }
}

/// 单个流的滤波状态快照
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SmoothState {
    /// 平滑后的 RSSI 估计 (dBm)
    pub estimate: f64,
    /// 估计的方差
    pub variance: f64,
    /// 最近一次更新对应的观测时间
    pub last_update: DateTime<Utc>,
    /// 已融合的样本数
    pub samples: u64,
}

impl SmoothState {
    /// 相对 `now` 的数据年龄，未来时间视为 0
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.last_update).max(chrono::Duration::zero())
    }
}

/// 一维卡尔曼滤波器
#[derive(Clone, Debug)]
pub struct SignalSmoother {
    settings: SmootherSettings,
    state: Option<SmoothState>,
}

impl SignalSmoother {
    /// 创建新的滤波器，第一次更新前没有状态
    pub fn new(settings: SmootherSettings) -> Self {
        SignalSmoother {
            settings,
            state: None,
        }
    }

    /// 当前状态（尚未收到样本时为 None）
    pub fn state(&self) -> Option<SmoothState> {
        self.state
    }

    /// 融合一个新的原始 RSSI 样本
    ///
    /// `dt` 为距上次更新的时间间隔；第一个样本直接作为初始估计，
    /// 方差取测量噪声。
    pub fn update(
        &mut self,
        raw_rssi: f64,
        dt: Duration,
        observed_at: DateTime<Utc>,
    ) -> SmoothState {
        let r = self.settings.measurement_noise;

        let next = match self.state {
            None => SmoothState {
                estimate: raw_rssi,
                variance: r,
                last_update: observed_at,
                samples: 1,
            },
            Some(prev) => {
                // 预测
                let p = prev.variance + self.settings.process_noise * dt.as_secs_f64();

                // 卡尔曼增益
                let k = p / (p + r);

                // 更新
                SmoothState {
                    estimate: prev.estimate + k * (raw_rssi - prev.estimate),
                    variance: (1.0 - k) * p,
                    last_update: observed_at.max(prev.last_update),
                    samples: prev.samples + 1,
                }
            }
        };

        self.state = Some(next);
        next
    }
}
