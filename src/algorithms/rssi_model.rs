/// RSSI 到距离转换模型
///
/// 对数距离路径损耗模型：
///
/// RSSI(d) = RSSI(1m) - 10 * n * log10(d)
///
/// 反解得 d = 10^((RSSI(1m) - RSSI) / (10 * n))。
///
/// 不对过大的距离做截断：极弱信号会换算出任意大的距离（甚至溢出为无穷），
/// 下游求解器必须能容忍这类估计。

use crate::algorithms::ReceiverAnchor;

/// 距离模型 - 平滑后的 RSSI + 锚点校准常数 -> 估计距离
///
/// 纯函数，无内部状态，可在任意上下文中调用。
pub trait DistanceModel: Send + Sync {
    /// 根据 RSSI 计算距离（单位与锚点坐标一致）
    fn rssi_to_distance(&self, smoothed_rssi: f64, anchor: &ReceiverAnchor) -> f64;

    /// 根据距离计算期望 RSSI（`rssi_to_distance` 的反函数）
    fn distance_to_rssi(&self, distance: f64, anchor: &ReceiverAnchor) -> f64;

    /// 模型名称
    fn name(&self) -> &'static str;
}

/// 对数距离路径损耗模型
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LogDistanceModel;

impl DistanceModel for LogDistanceModel {
    fn rssi_to_distance(&self, smoothed_rssi: f64, anchor: &ReceiverAnchor) -> f64 {
        let exponent =
            (anchor.calibrated_rssi_at_1m - smoothed_rssi) / (10.0 * anchor.path_loss_exponent);
        10_f64.powf(exponent)
    }

    fn distance_to_rssi(&self, distance: f64, anchor: &ReceiverAnchor) -> f64 {
        if distance <= 0.0 {
            return f64::INFINITY;
        }
        anchor.calibrated_rssi_at_1m - 10.0 * anchor.path_loss_exponent * distance.log10()
    }

    fn name(&self) -> &'static str {
        "log_distance"
    }
}
