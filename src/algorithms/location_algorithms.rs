/// 三边定位算法实现
///
/// 支持：
/// - 线性化三边定位（以第一个圆为参考相减消去二次项，直接求逆）
/// - 在线性化结果上做高斯-牛顿迭代的精化定位
/// - 启动时的锚点几何校验

use serde::{Deserialize, Serialize};

use crate::algorithms::{Position, ReceiverAnchor};
use crate::error::SolveError;

/// 至少需要三个圆才能在平面上定位
pub const MIN_ANCHORS: usize = 3;

/// 行列式低于该阈值即视为奇异
pub const DETERMINANT_EPSILON: f64 = 1e-10;

/// 定位求解器 - 固定输入输出契约，可替换实现
pub trait PositionSolver: Send + Sync {
    /// 根据锚点和对应距离求解 2D 位置
    ///
    /// `anchors` 与 `distances` 按下标一一对应，单位必须一致。
    fn solve(&self, anchors: &[ReceiverAnchor], distances: &[f64]) -> Result<Position, SolveError>;

    /// 求解器名称
    fn name(&self) -> &'static str;
}

/// 可配置的求解器类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// 线性化三边定位
    #[default]
    Linearized,
    /// 线性化 + 高斯-牛顿精化
    Refined,
}

impl SolverKind {
    /// 构建对应的求解器
    pub fn build(self) -> Box<dyn PositionSolver> {
        match self {
            SolverKind::Linearized => Box::new(LinearizedTrilateration),
            SolverKind::Refined => Box::new(RefinedTrilateration::default()),
        }
    }
}

// ============================================================================
// 线性化三边定位
// ============================================================================

/// 线性化三边定位
///
/// 三个圆方程两两相减（减去第一个）得到 x, y 的线性方程组。非迭代近似，
/// 圆不严格相交时仍返回线性方程组的解。锚点多于三个时使用正规方程。
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearizedTrilateration;

impl PositionSolver for LinearizedTrilateration {
    fn solve(&self, anchors: &[ReceiverAnchor], distances: &[f64]) -> Result<Position, SolveError> {
        check_input(anchors, distances)?;

        let rows = coefficient_rows(anchors);
        let r1 = distances[0];
        let (x1, y1) = anchors[0].coordinates();
        let rhs: Vec<f64> = anchors[1..]
            .iter()
            .zip(&distances[1..])
            .map(|(a, &r)| r1 * r1 - r * r - x1 * x1 + a.x * a.x - y1 * y1 + a.y * a.y)
            .collect();

        let position = if rows.len() == 2 {
            let [a11, a12] = rows[0];
            let [a21, a22] = rows[1];
            let det = a11 * a22 - a12 * a21;
            if det.abs() < DETERMINANT_EPSILON {
                return Err(SolveError::Degenerate { determinant: det });
            }
            let (b1, b2) = (rhs[0], rhs[1]);
            Position::new((b1 * a22 - b2 * a12) / det, (a11 * b2 - a21 * b1) / det)
        } else {
            // 正规方程 (AᵀA) p = Aᵀb
            let m = normal_matrix(&rows);
            let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
            if det.abs() < DETERMINANT_EPSILON {
                return Err(SolveError::Degenerate { determinant: det });
            }
            let mut v = [0.0; 2];
            for (row, b) in rows.iter().zip(&rhs) {
                v[0] += row[0] * b;
                v[1] += row[1] * b;
            }
            Position::new(
                (v[0] * m[1][1] - v[1] * m[0][1]) / det,
                (m[0][0] * v[1] - m[1][0] * v[0]) / det,
            )
        };

        if !position.is_finite() {
            return Err(SolveError::NonFinite);
        }
        Ok(position)
    }

    fn name(&self) -> &'static str {
        "trilateration_linearized"
    }
}

// ============================================================================
// 精化三边定位
// ============================================================================

/// 精化三边定位 - 以线性化结果为初值，最小化距离残差平方和
#[derive(Clone, Copy, Debug)]
pub struct RefinedTrilateration {
    /// 最大迭代次数
    pub max_iterations: usize,
    /// 步长低于该值时停止
    pub tolerance: f64,
}

impl Default for RefinedTrilateration {
    fn default() -> Self {
        RefinedTrilateration {
            max_iterations: 10,
            tolerance: 1e-9,
        }
    }
}

impl PositionSolver for RefinedTrilateration {
    fn solve(&self, anchors: &[ReceiverAnchor], distances: &[f64]) -> Result<Position, SolveError> {
        let mut p = LinearizedTrilateration.solve(anchors, distances)?;
        let mut best = (residual_error(anchors, distances, &p), p);

        for _ in 0..self.max_iterations {
            // JᵀJ 和 Jᵀf
            let mut jtj = [[0.0; 2]; 2];
            let mut jtf = [0.0; 2];

            for (anchor, &d) in anchors.iter().zip(distances) {
                let dx = p.x - anchor.x;
                let dy = p.y - anchor.y;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < 1e-6 {
                    continue;
                }
                let (jx, jy) = (dx / dist, dy / dist);
                let f = dist - d;
                jtj[0][0] += jx * jx;
                jtj[0][1] += jx * jy;
                jtj[1][1] += jy * jy;
                jtf[0] += jx * f;
                jtf[1] += jy * f;
            }
            jtj[1][0] = jtj[0][1];

            let det = jtj[0][0] * jtj[1][1] - jtj[0][1] * jtj[1][0];
            if det.abs() < DETERMINANT_EPSILON {
                break;
            }

            let step_x = (jtf[0] * jtj[1][1] - jtf[1] * jtj[0][1]) / det;
            let step_y = (jtj[0][0] * jtf[1] - jtj[1][0] * jtf[0]) / det;
            p = Position::new(p.x - step_x, p.y - step_y);
            if !p.is_finite() {
                break;
            }

            let residual = residual_error(anchors, distances, &p);
            if residual < best.0 {
                best = (residual, p);
            }

            if (step_x * step_x + step_y * step_y).sqrt() < self.tolerance {
                break;
            }
        }

        // 不收敛时退回残差最小的迭代点
        Ok(best.1)
    }

    fn name(&self) -> &'static str {
        "trilateration_refined"
    }
}

// ============================================================================
// 几何校验与诊断
// ============================================================================

/// 校验锚点布局可用于定位（数量足够且不共线）
///
/// 锚点在启动时确定，必须在此校验，否则每次求解都会失败。
pub fn validate_geometry(anchors: &[ReceiverAnchor]) -> Result<(), SolveError> {
    if anchors.len() < MIN_ANCHORS {
        return Err(SolveError::InsufficientAnchors {
            required: MIN_ANCHORS,
            available: anchors.len(),
        });
    }

    let rows = coefficient_rows(anchors);
    let det = if rows.len() == 2 {
        rows[0][0] * rows[1][1] - rows[0][1] * rows[1][0]
    } else {
        let m = normal_matrix(&rows);
        m[0][0] * m[1][1] - m[0][1] * m[1][0]
    };

    if !det.is_finite() || det.abs() < DETERMINANT_EPSILON {
        return Err(SolveError::Degenerate { determinant: det });
    }
    Ok(())
}

/// 解算点到各圆的均方根残差
pub fn residual_error(anchors: &[ReceiverAnchor], distances: &[f64], position: &Position) -> f64 {
    if anchors.is_empty() {
        return 0.0;
    }

    let sum: f64 = anchors
        .iter()
        .zip(distances)
        .map(|(anchor, &d)| {
            let error = anchor.distance_to(position) - d;
            error * error
        })
        .sum();

    (sum / anchors.len() as f64).sqrt()
}

fn check_input(anchors: &[ReceiverAnchor], distances: &[f64]) -> Result<(), SolveError> {
    if anchors.len() != distances.len() {
        return Err(SolveError::MismatchedInput {
            anchors: anchors.len(),
            distances: distances.len(),
        });
    }
    if anchors.len() < MIN_ANCHORS {
        return Err(SolveError::InsufficientAnchors {
            required: MIN_ANCHORS,
            available: anchors.len(),
        });
    }
    if distances.iter().any(|d| !d.is_finite()) {
        return Err(SolveError::NonFinite);
    }
    Ok(())
}

/// 线性化后的系数行：2 * (xi - x1), 2 * (yi - y1)
fn coefficient_rows(anchors: &[ReceiverAnchor]) -> Vec<[f64; 2]> {
    let (x1, y1) = anchors[0].coordinates();
    anchors[1..]
        .iter()
        .map(|a| [2.0 * (a.x - x1), 2.0 * (a.y - y1)])
        .collect()
}

fn normal_matrix(rows: &[[f64; 2]]) -> [[f64; 2]; 2] {
    let mut m = [[0.0; 2]; 2];
    for row in rows {
        m[0][0] += row[0] * row[0];
        m[0][1] += row[0] * row[1];
        m[1][1] += row[1] * row[1];
    }
    m[1][0] = m[0][1];
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<ReceiverAnchor> {
        vec![
            ReceiverAnchor::new("R1", 0.0, 0.0, -59.0, 2.0),
            ReceiverAnchor::new("R2", 10.0, 0.0, -59.0, 2.0),
            ReceiverAnchor::new("R3", 5.0, 8.66, -59.0, 2.0),
        ]
    }

    fn exact_distances(anchors: &[ReceiverAnchor], truth: &Position) -> Vec<f64> {
        anchors.iter().map(|a| a.distance_to(truth)).collect()
    }

    #[test]
    fn test_linearized_exact_intersection() {
        let anchors = triangle();
        let truth = Position::new(4.0, 3.0);
        let distances = exact_distances(&anchors, &truth);
        let p = LinearizedTrilateration.solve(&anchors, &distances).unwrap();
        assert!(p.distance_to(&truth) < 1e-9);
    }

    #[test]
    fn test_linearized_noisy_distances_still_solve() {
        let anchors = triangle();
        let p = LinearizedTrilateration
            .solve(&anchors, &[5.5, 6.1, 6.0])
            .unwrap();
        assert!(p.is_finite());
    }

    #[test]
    fn test_collinear_is_degenerate() {
        let anchors = vec![
            ReceiverAnchor::new("R1", 0.0, 1.0, -59.0, 2.0),
            ReceiverAnchor::new("R2", 4.0, 1.0, -59.0, 2.0),
            ReceiverAnchor::new("R3", 9.0, 1.0, -59.0, 2.0),
        ];
        let result = LinearizedTrilateration.solve(&anchors, &[1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(SolveError::Degenerate { .. })));
        assert!(matches!(
            validate_geometry(&anchors),
            Err(SolveError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_input_checks() {
        let anchors = triangle();
        assert_eq!(
            LinearizedTrilateration.solve(&anchors[..2], &[1.0, 2.0]),
            Err(SolveError::InsufficientAnchors {
                required: 3,
                available: 2
            })
        );
        assert_eq!(
            LinearizedTrilateration.solve(&anchors, &[1.0, 2.0]),
            Err(SolveError::MismatchedInput {
                anchors: 3,
                distances: 2
            })
        );
        assert_eq!(
            LinearizedTrilateration.solve(&anchors, &[1.0, f64::INFINITY, 2.0]),
            Err(SolveError::NonFinite)
        );
    }

    #[test]
    fn test_four_anchors_use_normal_equations() {
        let mut anchors = triangle();
        anchors.push(ReceiverAnchor::new("R4", 0.0, 9.0, -59.0, 2.0));
        let truth = Position::new(6.0, 2.0);
        let distances = exact_distances(&anchors, &truth);
        let p = LinearizedTrilateration.solve(&anchors, &distances).unwrap();
        assert!(p.distance_to(&truth) < 1e-6);
    }

    #[test]
    fn test_refined_reduces_residual() {
        let anchors = triangle();
        let distances = [5.3, 6.4, 5.2];
        let linear = LinearizedTrilateration.solve(&anchors, &distances).unwrap();
        let refined = RefinedTrilateration::default()
            .solve(&anchors, &distances)
            .unwrap();
        assert!(
            residual_error(&anchors, &distances, &refined)
                <= residual_error(&anchors, &distances, &linear) + 1e-9
        );
    }

    #[test]
    fn test_residual_zero_for_exact() {
        let anchors = triangle();
        let truth = Position::new(5.0, 2.0);
        let distances = exact_distances(&anchors, &truth);
        assert!(residual_error(&anchors, &distances, &truth) < 1e-12);
    }

    #[test]
    fn test_solver_kind_build() {
        assert_eq!(SolverKind::default().build().name(), "trilateration_linearized");
        assert_eq!(SolverKind::Refined.build().name(), "trilateration_refined");
    }
}
