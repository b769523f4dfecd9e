/// 算法模块综合测试
///
/// 覆盖平滑滤波、距离模型和三边定位求解的数值性质

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use std::time::Duration;
    use trinav::algorithms::*;
    use trinav::error::SolveError;

    fn equilateral_anchors() -> Vec<ReceiverAnchor> {
        vec![
            ReceiverAnchor::new("R1", 0.0, 0.0, -59.0, 2.0),
            ReceiverAnchor::new("R2", 10.0, 0.0, -59.0, 2.0),
            ReceiverAnchor::new("R3", 5.0, 8.66, -59.0, 2.0),
        ]
    }

    #[test]
    fn test_smoother_variance_non_negative_and_estimate_bounded() {
        let mut smoother = SignalSmoother::new(SmootherSettings::new(0.5, 3.0));
        let now = Utc::now();

        // 有界输入的伪随机序列
        let mut seed: u64 = 0x9e3779b97f4a7c15;
        for i in 0..2000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let raw = -100.0 + (seed % 7000) as f64 / 100.0; // [-100, -30)
            let dt = Duration::from_millis(1 + (i % 500) as u64);
            let state = smoother.update(raw, dt, now);

            assert!(state.variance >= 0.0, "方差出现负值: {}", state.variance);
            assert!(state.variance.is_finite());
            assert!(
                (-100.0..=-30.0).contains(&state.estimate),
                "估计值越界: {}",
                state.estimate
            );
        }
    }

    #[test]
    fn test_smoother_converges_to_constant_input() {
        let mut smoother = SignalSmoother::new(SmootherSettings::new(0.01, 4.0));
        let now = Utc::now();
        smoother.update(-90.0, Duration::ZERO, now);

        let target = -62.0;
        let mut previous_gap = f64::INFINITY;
        for _ in 0..1000 {
            let state = smoother.update(target, Duration::from_secs(1), now);
            let gap = (state.estimate - target).abs();
            // 单调逼近
            assert!(gap <= previous_gap);
            previous_gap = gap;
        }
        assert!(previous_gap < 1e-3, "未收敛, 剩余误差 {}", previous_gap);
    }

    #[test]
    fn test_distance_model_strictly_decreasing() {
        let anchor = ReceiverAnchor::new("R1", 0.0, 0.0, -59.0, 1.8);
        let model = LogDistanceModel;

        let mut previous = f64::INFINITY;
        for step in 0..120 {
            let rssi = -110.0 + step as f64 * 0.75;
            let d = model.rssi_to_distance(rssi, &anchor);
            assert!(d > 0.0 && d.is_finite());
            assert!(d < previous, "RSSI {} 处距离未递减", rssi);
            previous = d;
        }
    }

    #[test]
    fn test_distance_model_round_trip() {
        let model = LogDistanceModel;
        for (calibrated, n) in [(-59.0, 1.8), (-90.0, 1.8), (-45.0, 3.5)] {
            let anchor = ReceiverAnchor::new("R", 0.0, 0.0, calibrated, n);
            for rssi in [-95.0, -72.5, -60.0, -41.0] {
                let d = model.rssi_to_distance(rssi, &anchor);
                let back = model.distance_to_rssi(d, &anchor);
                assert!((back - rssi).abs() < 1e-9, "{} -> {} -> {}", rssi, d, back);
            }
        }
    }

    #[test]
    fn test_solver_noiseless_point_inside_triangle() {
        let anchors = equilateral_anchors();
        let truth = Position::new(5.0, 3.0);
        let distances: Vec<f64> = anchors.iter().map(|a| a.distance_to(&truth)).collect();

        let result = LinearizedTrilateration.solve(&anchors, &distances).unwrap();
        println!("三边定位结果: {}", result);
        assert!(result.distance_to(&truth) < 1e-6);
    }

    #[test]
    fn test_solver_recovers_point_through_distance_model() {
        // 期望 RSSI -> 距离 -> 位置
        let anchors = equilateral_anchors();
        let model = LogDistanceModel;
        let truth = Position::new(3.5, 2.0);

        let distances: Vec<f64> = anchors
            .iter()
            .map(|a| {
                let rssi = model.distance_to_rssi(a.distance_to(&truth), a);
                model.rssi_to_distance(rssi, a)
            })
            .collect();

        let result = LinearizedTrilateration.solve(&anchors, &distances).unwrap();
        assert!(result.distance_to(&truth) < 1e-6);
    }

    #[test]
    fn test_solver_collinear_same_y_is_degenerate() {
        let anchors = vec![
            ReceiverAnchor::new("R1", 0.0, 3.0, -59.0, 2.0),
            ReceiverAnchor::new("R2", 5.0, 3.0, -59.0, 2.0),
            ReceiverAnchor::new("R3", 10.0, 3.0, -59.0, 2.0),
        ];
        let result = LinearizedTrilateration.solve(&anchors, &[4.0, 2.0, 6.0]);
        assert!(matches!(result, Err(SolveError::Degenerate { .. })));
        assert!(validate_geometry(&anchors).is_err());
        assert!(validate_geometry(&equilateral_anchors()).is_ok());
    }

    #[test]
    fn test_solver_strategies_interchangeable() {
        let anchors = equilateral_anchors();
        let truth = Position::new(6.0, 4.0);
        let distances: Vec<f64> = anchors.iter().map(|a| a.distance_to(&truth)).collect();

        let solvers: Vec<Box<dyn PositionSolver>> =
            vec![SolverKind::Linearized.build(), SolverKind::Refined.build()];
        for solver in solvers {
            let p = solver.solve(&anchors, &distances).unwrap();
            println!("{}: {}", solver.name(), p);
            assert!(p.distance_to(&truth) < 1e-6);
        }
    }
}
