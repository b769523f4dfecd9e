/// 定位结果数据结构
///
/// 包含定位输出的坐标和发布时附带的元数据

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// 2D 位置（与锚点同一坐标系）
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    /// 获取 2D 坐标
    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// 与另一位置的欧几里得距离
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// 已发布的定位结果
///
/// 位置和时间戳作为一个整体写入和读取，读者不会看到新位置配旧时间戳。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PositionFix {
    pub position: Position,
    /// 计算该位置的调度时刻
    pub computed_at: DateTime<Utc>,
    /// 解算点到各圆半径的均方根残差（单位与坐标一致）
    pub residual: f64,
    /// 参与解算的距离，按锚点配置顺序
    pub distances: Vec<f64>,
}

impl PositionFix {
    pub fn new(position: Position, computed_at: DateTime<Utc>) -> Self {
        PositionFix {
            position,
            computed_at,
            residual: 0.0,
            distances: Vec::new(),
        }
    }

    /// 附带解算诊断信息
    pub fn with_diagnostics(mut self, residual: f64, distances: Vec<f64>) -> Self {
        self.residual = residual;
        self.distances = distances;
        self
    }

    /// 获取详细描述
    pub fn detailed_description(&self) -> String {
        format!(
            "位置: {}, 残差: {:.3}, 距离: {:?}, 时间: {}",
            self.position,
            self.residual,
            self.distances,
            self.computed_at.format("%H:%M:%S%.3f")
        )
    }
}

impl fmt::Display for PositionFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {}",
            self.position,
            self.computed_at.format("%H:%M:%S%.3f")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.xy(), (3.0, 4.0));
    }

    #[test]
    fn test_position_display() {
        assert_eq!(Position::new(1.0, 2.345).to_string(), "(1.00, 2.35)");
    }

    #[test]
    fn test_fix_with_diagnostics() {
        let fix = PositionFix::new(Position::new(1.0, 1.0), Utc::now())
            .with_diagnostics(0.25, vec![1.0, 2.0, 3.0]);
        assert_eq!(fix.residual, 0.25);
        assert_eq!(fix.distances.len(), 3);
    }
}
