use approx::assert_abs_diff_eq;
use ndarray::{Array1, Axis};
use num_complex::Complex64;
use num_traits::NumCast;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::auxiliary::scalar::{modulus, TdmScalar};
use crate::drivers::tdm::{LassiFragment, LassiTdmDriver, LassiTdmParams};
use crate::drivers::LassiDriver;
use crate::error::TdmError;
use crate::solver::determinant::DeterminantSolver;
use crate::solver::{FragmentSolver, Sector};

struct Fixture<T> {
    norbs: Vec<usize>,
    nelecs: Vec<usize>,
    solvers: Vec<DeterminantSolver>,
    ci: Vec<Vec<Array1<T>>>,
}

impl<T> Fixture<T> {
    fn fragments(&self) -> Vec<LassiFragment<'_, T, DeterminantSolver>> {
        (0..self.norbs.len())
            .map(|f| {
                LassiFragment::new(self.norbs[f], self.nelecs[f], &self.solvers[f], &self.ci[f])
            })
            .collect()
    }
}

fn fixture<T: TdmScalar>(mut amplitude: impl FnMut(&mut StdRng) -> T) -> Fixture<T> {
    let mut rng = StdRng::seed_from_u64(2023);
    let norbs = vec![2, 2];
    let nelecs = vec![2, 2];
    let sectors: Vec<Vec<Sector>> = vec![
        vec![(1, 1), (2, 0), (0, 1), (1, 1), (1, 0)],
        vec![(1, 0), (0, 1), (2, 1), (1, 0), (1, 1)],
    ];
    let solvers = sectors
        .iter()
        .zip(nelecs.iter())
        .map(|(s, &nelec)| DeterminantSolver::from_sectors(nelec, s))
        .collect::<Vec<_>>();
    let ci = sectors
        .iter()
        .zip(norbs.iter())
        .zip(solvers.iter())
        .map(|((s, &norb), solver)| {
            s.iter()
                .map(|&nelec| {
                    let dim = FragmentSolver::<T>::sector_dim(solver, norb, nelec).unwrap();
                    let v = Array1::from_iter((0..dim).map(|_| amplitude(&mut rng)));
                    let norm = v.iter().map(|&x| modulus(x).powi(2)).sum::<f64>().sqrt();
                    let scale = <T as NumCast>::from(1.0 / norm).unwrap();
                    v.mapv(|x| x * scale)
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    Fixture {
        norbs,
        nelecs,
        solvers,
        ci,
    }
}

fn real_fixture() -> Fixture<f64> {
    fixture(|rng| rng.gen_range(-1.0..1.0))
}

#[test]
fn test_tdm_params_defaults() {
    let params = LassiTdmParams::builder().build().unwrap();
    assert_abs_diff_eq!(params.antisymmetry_threshold, 1e-8);
    assert!(params.parallel);
    assert!(params.hermiticity_check_threshold.is_none());

    let params: LassiTdmParams = serde_yaml::from_str("parallel: false").unwrap();
    assert!(!params.parallel);
    assert_abs_diff_eq!(params.antisymmetry_threshold, 1e-8);

    let params: LassiTdmParams =
        serde_yaml::from_str("hermiticity_check_threshold: 1.0e-10\nantisymmetry_threshold: 1.0e-6")
            .unwrap();
    assert_eq!(params.hermiticity_check_threshold, Some(1e-10));
    assert_abs_diff_eq!(params.antisymmetry_threshold, 1e-6);
    assert!(params.parallel);
}

#[test]
fn test_tdm_driver_run() {
    let system = real_fixture();
    let params = LassiTdmParams::builder()
        .hermiticity_check_threshold(Some(1e-12))
        .build()
        .unwrap();
    let mut driver = LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(system.fragments())
        .build()
        .unwrap();
    assert!(driver.result().is_err());
    assert!(driver.run().is_ok());

    let result = driver.result().unwrap();
    assert_eq!(result.active_roots(), &[0, 1, 2, 3, 4]);
    assert_eq!(result.nelec(), &[(2, 1), (2, 1), (2, 2), (2, 1), (2, 1)]);
    assert_eq!(result.tdm1().shape(), &[5, 5, 2, 4, 4]);
    assert_eq!(result.tdm2().shape(), &[5, 5, 4, 4, 4, 4, 4]);
    for (state, &(na, nb)) in result.nelec().iter().enumerate() {
        let d1 = result.tdm1().index_axis(Axis(0), state);
        let d1 = d1.index_axis(Axis(0), state);
        assert_abs_diff_eq!(
            d1.index_axis(Axis(0), 0).diag().sum(),
            na as f64,
            epsilon = 1e-10
        );
        assert_abs_diff_eq!(
            d1.index_axis(Axis(0), 1).diag().sum(),
            nb as f64,
            epsilon = 1e-10
        );
    }

    // Sequential evaluation reproduces the parallel result.
    let params_seq = LassiTdmParams::builder().parallel(false).build().unwrap();
    let mut driver_seq = LassiTdmDriver::builder()
        .parameters(&params_seq)
        .fragments(system.fragments())
        .build()
        .unwrap();
    driver_seq.run().unwrap();
    let result_seq = driver_seq.result().unwrap();
    assert_abs_diff_eq!(result.tdm1(), result_seq.tdm1(), epsilon = 1e-14);
    assert_abs_diff_eq!(result.tdm2(), result_seq.tdm2(), epsilon = 1e-14);
}

#[test]
fn test_tdm_driver_active_roots() {
    let system = real_fixture();
    let params = LassiTdmParams::default();
    let mut driver_full = LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(system.fragments())
        .build()
        .unwrap();
    driver_full.run().unwrap();
    let full = driver_full.result().unwrap();

    let active = vec![3, 0, 4];
    let mut driver = LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(system.fragments())
        .active_roots(Some(active.clone()))
        .build()
        .unwrap();
    driver.run().unwrap();
    let result = driver.result().unwrap();
    assert_eq!(result.active_roots(), active.as_slice());
    assert_abs_diff_eq!(
        result.tdm1(),
        &full
            .tdm1()
            .select(Axis(0), &active)
            .select(Axis(1), &active),
        epsilon = 1e-12
    );
    assert_abs_diff_eq!(
        result.tdm2(),
        &full
            .tdm2()
            .select(Axis(0), &active)
            .select(Axis(1), &active),
        epsilon = 1e-12
    );
}

#[test]
fn test_tdm_driver_complex_hermiticity() {
    let system = fixture(|rng| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)));
    let params = LassiTdmParams::builder()
        .hermiticity_check_threshold(Some(1e-12))
        .build()
        .unwrap();
    let mut driver = LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(system.fragments())
        .build()
        .unwrap();
    driver.run().unwrap();
    let tdm1 = driver.result().unwrap().tdm1();
    assert_abs_diff_eq!(
        tdm1[[0, 3, 0, 1, 0]],
        tdm1[[3, 0, 0, 0, 1]].conj(),
        epsilon = 1e-12
    );
}

#[test]
fn test_tdm_driver_validation() {
    let system = real_fixture();
    let params = LassiTdmParams::default();

    // Mismatched numbers of roots across fragments.
    let mut fragments = system.fragments();
    fragments[1] = LassiFragment::new(2, 2, &system.solvers[1], &system.ci[1][..3]);
    assert!(LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(fragments)
        .build()
        .is_err());

    // No fragments.
    assert!(LassiTdmDriver::<f64, DeterminantSolver>::builder()
        .parameters(&params)
        .fragments(vec![])
        .build()
        .is_err());

    // Active roots out of range or repeated.
    assert!(LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(system.fragments())
        .active_roots(Some(vec![0, 5]))
        .build()
        .is_err());
    assert!(LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(system.fragments())
        .active_roots(Some(vec![1, 1]))
        .build()
        .is_err());

    // Amplitude vectors inconsistent with the solver sectors.
    let mut bad_ci = system.ci[0].clone();
    bad_ci[2] = Array1::zeros(3);
    let mut fragments = system.fragments();
    fragments[0] = LassiFragment::new(2, 2, &system.solvers[0], &bad_ci);
    let mut driver = LassiTdmDriver::builder()
        .parameters(&params)
        .fragments(fragments)
        .build()
        .unwrap();
    let err = driver.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TdmError>(),
        Some(TdmError::MalformedInput(_))
    ));
    assert!(driver.result().is_err());
}
