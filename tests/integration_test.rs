use approx::assert_abs_diff_eq;
use ndarray::{array, s, Array1, Axis, IxDyn};
use num_complex::Complex64;

use lassi_tdm::drivers::tdm::{LassiFragment, LassiTdmDriver, LassiTdmParams};
use lassi_tdm::drivers::LassiDriver;
use lassi_tdm::error::TdmError;
use lassi_tdm::solver::determinant::{DeterminantSolver, RootSector};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two one-orbital fragments holding one electron in total: the minimal single-hop system.
#[test]
fn test_integration_minimal_single_hop() {
    init_logger();
    let solvers = [
        DeterminantSolver::from_sectors(1, &[(1, 0), (0, 0)]),
        DeterminantSolver::from_sectors(1, &[(0, 0), (1, 0)]),
    ];
    let ci = [vec![array![1.0], array![1.0]], vec![array![1.0], array![1.0]]];
    let params = LassiTdmParams::builder()
        .hermiticity_check_threshold(Some(1e-12))
        .build()
        .unwrap();
    let mut driver = LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(vec![
            LassiFragment::new(1, 1, &solvers[0], &ci[0]),
            LassiFragment::new(1, 1, &solvers[1], &ci[1]),
        ])
        .build()
        .unwrap();
    driver.run().unwrap();
    let result = driver.result().unwrap();

    let tdm1 = result.tdm1();
    assert_abs_diff_eq!(f64::abs(tdm1[[0, 1, 0, 0, 1]]), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(f64::abs(tdm1[[1, 0, 0, 1, 0]]), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(tdm1[[0, 0, 0, 0, 0]], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(tdm1[[1, 1, 0, 1, 1]], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(
        tdm1.slice(s![.., .., 1, .., ..]).mapv(f64::abs).sum(),
        0.0,
        epsilon = 1e-12
    );
    assert_abs_diff_eq!(result.tdm2().mapv(f64::abs).sum(), 0.0, epsilon = 1e-12);
}

/// Two two-orbital fragments holding four electrons, connected by pair hops and single hops
/// between complex states.
#[test]
fn test_integration_two_fragment_complex() {
    init_logger();
    let solvers = [
        DeterminantSolver::new(vec![
            RootSector::new(0, 0),
            RootSector::new(-1, 1),
            RootSector::new(1, 1),
            RootSector::new(2, 0),
        ]),
        DeterminantSolver::new(vec![
            RootSector::new(0, 0),
            RootSector::new(1, -1),
            RootSector::new(-1, -1),
            RootSector::new(-2, 0),
        ]),
    ];
    // Fragment sectors: (1, 1), (2, 1), (1, 0), (0, 0) and (1, 1), (0, 1), (1, 2), (2, 2).
    let c = |re: f64, im: f64| Complex64::new(re, im);
    let ci0 = vec![
        array![c(0.5, 0.1), c(0.2, -0.3), c(-0.4, 0.0), c(0.6, 0.2)],
        array![c(0.8, 0.0), c(0.0, 0.6)],
        array![c(0.6, 0.0), c(0.0, -0.8)],
        array![c(1.0, 0.0)],
    ];
    let ci1 = vec![
        array![c(0.1, 0.7), c(-0.3, 0.2), c(0.5, 0.0), c(0.2, -0.3)],
        array![c(0.0, 1.0), c(0.0, 0.0)],
        array![c(0.6, 0.8), c(0.0, 0.0)],
        array![c(1.0, 0.0)],
    ];
    let normalise = |v: &Array1<Complex64>| {
        let norm = v.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
        v.mapv(|x| x / norm)
    };
    let ci0 = ci0.iter().map(normalise).collect::<Vec<_>>();
    let ci1 = ci1.iter().map(normalise).collect::<Vec<_>>();

    let params = LassiTdmParams::builder()
        .hermiticity_check_threshold(Some(1e-12))
        .build()
        .unwrap();
    let mut driver = LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(vec![
            LassiFragment::new(2, 2, &solvers[0], &ci0),
            LassiFragment::new(2, 2, &solvers[1], &ci1),
        ])
        .build()
        .unwrap();
    driver.run().unwrap();
    let result = driver.result().unwrap();
    assert_eq!(result.nelec(), &[(2, 2), (2, 2), (2, 2), (2, 2)]);

    for state in 0..4 {
        let d1 = result.tdm1().slice(s![state, state, .., .., ..]);
        let n = d1
            .axis_iter(Axis(0))
            .map(|block| block.diag().sum())
            .sum::<Complex64>();
        assert_abs_diff_eq!(n, c(4.0, 0.0), epsilon = 1e-10);

        let d2_trace = (0..4)
            .flat_map(|ch| (0..4).flat_map(move |p| (0..4).map(move |r| (ch, p, r))))
            .map(|(ch, p, r)| result.tdm2()[IxDyn(&[state, state, ch, p, p, r, r])])
            .sum::<Complex64>();
        assert_abs_diff_eq!(d2_trace, c(12.0, 0.0), epsilon = 1e-10);
    }
}

#[test]
fn test_integration_malformed_roots() {
    init_logger();
    // A root with 2Ms = 3 cannot be realised with two electrons.
    let solvers = [
        DeterminantSolver::new(vec![RootSector::new(0, 3)]),
        DeterminantSolver::new(vec![RootSector::new(0, 0)]),
    ];
    let ci = [vec![array![1.0]], vec![array![1.0]]];
    let params = LassiTdmParams::default();
    let mut driver = LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(vec![
            LassiFragment::new(2, 2, &solvers[0], &ci[0]),
            LassiFragment::new(2, 0, &solvers[1], &ci[1]),
        ])
        .build()
        .unwrap();
    let err = driver.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TdmError>(),
        Some(TdmError::MalformedInput(_))
    ));
}
