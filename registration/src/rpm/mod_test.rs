#[cfg(test)]
mod tests {
    use crate::rpm::config::RpmConfig;
    use crate::rpm::{estimate, TemperatureSchedule};
    use nalgebra::DMatrix;

    fn corners() -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn test_schedule_is_strictly_decreasing_geometric() {
        let temperatures: Vec<f64> = TemperatureSchedule::new(1.0, 1e-3, 0.9).collect();
        assert!(!temperatures.is_empty());
        assert_eq!(temperatures[0], 1.0);
        assert!(*temperatures.last().unwrap() >= 1e-3);
        for pair in temperatures.windows(2) {
            assert!(pair[1] < pair[0]);
            assert!((pair[1] / pair[0] - 0.9).abs() < 1e-12);
        }
        // One more cooling step would cross the floor.
        assert!(temperatures.last().unwrap() * 0.9 < 1e-3);
    }

    #[test]
    fn test_schedule_empty_when_start_below_floor() {
        assert_eq!(TemperatureSchedule::new(0.5, 1.0, 0.9).count(), 0);
    }

    #[test]
    fn test_rejects_non_2d_points() {
        let bad = DMatrix::<f64>::zeros(5, 3);
        let good = corners();
        assert!(estimate(&bad, &good, &[], &RpmConfig::default()).is_err());
        assert!(estimate(&good, &bad, &[], &RpmConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_too_few_points() {
        let three = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let good = corners();
        assert!(estimate(&three, &good, &[], &RpmConfig::default()).is_err());
        assert!(estimate(&good, &three, &[], &RpmConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_non_finite_coordinates() {
        let mut bad = corners();
        bad[(2, 1)] = f64::NAN;
        assert!(estimate(&bad, &corners(), &[], &RpmConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = RpmConfig::default().with_annealing_ratio(1.5);
        assert!(estimate(&corners(), &corners(), &[], &config).is_err());
    }

    #[test]
    fn test_minimum_size_identity_fit() {
        // K = N = 4 is the smallest admissible problem; the null-space basis
        // has a single column and the fit degenerates to least-squares
        // affine.
        let x = corners();
        let config = RpmConfig::default();
        let result = estimate(&x, &x, &[], &config).unwrap();

        assert_eq!(result.correspondence.shape(), (4, 4));
        for k in 0..4 {
            assert!(result.correspondence[(k, k)] > 0.5);
        }
        let eye = DMatrix::<f64>::identity(3, 3);
        assert!((&result.params.d - eye).amax() < 1e-3);
        assert!(result.params.w.amax() < 1e-3);
    }
}
