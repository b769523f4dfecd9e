//! 基于 RSSI 三边定位的室内标签追踪
//!
//! 三个位置已知的接收器上报各标签的 RSSI，流水线对每个 (标签, 接收器)
//! 流做平滑，按路径损耗模型换算距离，三边定位后发布各标签的 2D 位置。

pub mod algorithms;
pub mod config;
pub mod error;
pub mod message;
pub mod positioning;

pub use algorithms::{
    AnchorSet, DistanceModel, LinearizedTrilateration, LogDistanceModel, Position, PositionFix,
    PositionSolver, ReceiverAnchor, RefinedTrilateration, SignalSmoother, SmoothState,
    SmootherSettings, SolverKind,
};
pub use config::PositioningConfig;
pub use error::{ConfigError, DecodeError, IngestError, MalformedReading, MessageError, SolveError};
pub use message::ReadingDecoder;
pub use positioning::{
    IngestRouter, PositioningSystem, RawReading, Scheduler, SkipReason, TagRecord, TagStateStore,
    TickReport,
};
