/// 定位算法模块
///
/// 该模块提供定位流水线中的纯计算部分：
/// - 接收器锚点定义
/// - RSSI 信号平滑（每流独立的卡尔曼滤波）
/// - RSSI 转距离模型
/// - 三边定位求解
///
/// 这些组件都不做阻塞 I/O，可在接入路径和调度路径中直接调用。

pub mod location_algorithms;
pub mod rssi_model;
pub mod beacon;
pub mod results;
pub mod smoother;

pub use location_algorithms::*;
pub use rssi_model::*;
pub use beacon::*;
pub use results::*;
pub use smoother::*;
