use approx::assert_abs_diff_eq;
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::auxiliary::spin::{PairChannel, Spin};
use crate::error::TdmError;
use crate::hopping::HoppingIndex;
use crate::intermediates::builder::build_fragment_intermediates;
use crate::solver::determinant::DeterminantSolver;
use crate::solver::{FragmentSolver, Sector};

fn random_ci(norb: usize, nelec: Sector, rng: &mut StdRng) -> Array1<f64> {
    let solver = DeterminantSolver::new(vec![]);
    let dim = FragmentSolver::<f64>::sector_dim(&solver, norb, nelec).unwrap();
    let ci = Array1::from_iter((0..dim).map(|_| rng.gen_range(-1.0f64..1.0)));
    let norm: f64 = ci.dot(&ci).sqrt();
    ci / norm
}

/// Evaluates `⟨bra| a_{x s1} a_{y s2} |ket⟩` by annihilating `y` first.
fn direct_two_holes(
    bra: &Array1<f64>,
    ket: &Array1<f64>,
    norb: usize,
    nelec: Sector,
    (s1, x): (Spin, usize),
    (s2, y): (Spin, usize),
) -> f64 {
    let solver = DeterminantSolver::new(vec![]);
    let once = FragmentSolver::<f64>::annihilate(&solver, ket.view(), norb, nelec, s2, y).unwrap();
    let once_nelec = match s2 {
        Spin::Alpha => (nelec.0 - 1, nelec.1),
        Spin::Beta => (nelec.0, nelec.1 - 1),
    };
    let twice =
        FragmentSolver::<f64>::annihilate(&solver, once.view(), norb, once_nelec, s1, x).unwrap();
    bra.dot(&twice)
}

struct TwoFragmentSystem {
    hopping: HoppingIndex,
    ci: Vec<Vec<Array1<f64>>>,
    norbs: [usize; 2],
}

fn two_fragment_system() -> TwoFragmentSystem {
    let mut rng = StdRng::seed_from_u64(17);
    let norbs = [3, 2];
    let nelec_frs = vec![vec![(2, 1), (0, 1), (1, 0)], vec![(0, 0), (2, 0), (1, 1)]];
    let ci = nelec_frs
        .iter()
        .zip(norbs.iter())
        .map(|(frag, &norb)| {
            frag.iter()
                .map(|&nelec| random_ci(norb, nelec, &mut rng))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    TwoFragmentSystem {
        hopping: HoppingIndex::new(&nelec_frs).unwrap(),
        ci,
        norbs,
    }
}

#[test]
fn test_builder_same_spin_pair_amplitudes_antisymmetric() {
    let system = two_fragment_system();
    let solver = DeterminantSolver::new(vec![]);
    let store0 =
        build_fragment_intermediates(0, 3, &solver, &system.ci[0], &system.hopping).unwrap();
    let store1 =
        build_fragment_intermediates(1, 2, &solver, &system.ci[1], &system.hopping).unwrap();

    let hh = store0.get_hh(PairChannel::AlphaAlpha, 1, 0).unwrap();
    assert_abs_diff_eq!(&hh + &hh.t(), Array2::<f64>::zeros((3, 3)), epsilon = 1e-8);
    assert!(hh.iter().any(|x| x.abs() > 1e-3));
    for x in 0..3 {
        for y in 0..3 {
            if x != y {
                let direct = direct_two_holes(
                    &system.ci[0][1],
                    &system.ci[0][0],
                    system.norbs[0],
                    (2, 1),
                    (Spin::Alpha, x),
                    (Spin::Alpha, y),
                );
                assert_abs_diff_eq!(hh[(x, y)], direct, epsilon = 1e-12);
            }
        }
    }

    let pp = store1.get_pp(PairChannel::AlphaAlpha, 1, 0).unwrap();
    assert_abs_diff_eq!(&pp + &pp.t(), Array2::<f64>::zeros((2, 2)), epsilon = 1e-8);
    let hh1 = store1.get_hh(PairChannel::AlphaAlpha, 0, 1).unwrap();
    assert_abs_diff_eq!(pp, hh1.t(), epsilon = 1e-14);
}

#[test]
fn test_builder_mixed_pair_amplitudes() {
    let system = two_fragment_system();
    let solver = DeterminantSolver::new(vec![]);
    let store0 =
        build_fragment_intermediates(0, 3, &solver, &system.ci[0], &system.hopping).unwrap();
    let hh = store0.get_hh(PairChannel::AlphaBeta, 2, 0).unwrap();
    for x in 0..3 {
        for y in 0..3 {
            let direct = direct_two_holes(
                &system.ci[0][2],
                &system.ci[0][0],
                system.norbs[0],
                (2, 1),
                (Spin::Alpha, x),
                (Spin::Beta, y),
            );
            assert_abs_diff_eq!(hh[(x, y)], direct, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_builder_spectator_and_missing_intermediates() {
    let system = two_fragment_system();
    let solver = DeterminantSolver::new(vec![]);
    let store1 =
        build_fragment_intermediates(1, 2, &solver, &system.ci[1], &system.hopping).unwrap();
    assert_abs_diff_eq!(store1.get_ovlp(0, 0).unwrap(), 1.0, epsilon = 1e-12);
    let dm1 = store1.get_dm1(2, 2).unwrap();
    let trace = (0..2)
        .map(|s| (0..2).map(|p| dm1[(s, p, p)]).sum::<f64>())
        .sum::<f64>();
    assert_abs_diff_eq!(trace, 2.0, epsilon = 1e-12);
    assert!(store1.get_dm2(2, 2).is_ok());

    // States 1 and 2 differ by a spin hop; fragment 1 loses α and gains β from 1 to 2.
    assert!(store1.get_sm(2, 1).is_ok());
    assert!(store1.get_sp(1, 2).is_ok());
    assert!(store1.get_sm(0, 1).is_err());
    assert!(store1.get_hh(PairChannel::AlphaBeta, 0, 2).is_ok());
    assert!(store1.get_h(Spin::Alpha, 0, 2).is_err());
    assert!(store1.get_dm1(0, 2).is_err());
}

#[test]
fn test_builder_single_hop_three_operator_amplitudes() {
    let mut rng = StdRng::seed_from_u64(5);
    let nelec_frs = vec![vec![(1, 1), (2, 1)], vec![(1, 0), (0, 0)]];
    let ci0 = vec![random_ci(3, (1, 1), &mut rng), random_ci(3, (2, 1), &mut rng)];
    let ci1 = vec![random_ci(1, (1, 0), &mut rng), random_ci(1, (0, 0), &mut rng)];
    let hopping = HoppingIndex::new(&nelec_frs).unwrap();
    let solver = DeterminantSolver::new(vec![]);
    let store0 = build_fragment_intermediates(0, 3, &solver, &ci0, &hopping).unwrap();
    let store1 = build_fragment_intermediates(1, 1, &solver, &ci1, &hopping).unwrap();

    // Fragment 0 loses an α electron from state 1 to state 0.
    let phh = store0.get_phh(Spin::Alpha, 0, 1).unwrap();
    let h = store0.get_h(Spin::Alpha, 0, 1).unwrap();
    assert_eq!(phh.shape(), &[2, 3, 3, 3]);
    let pph = store0.get_pph(Spin::Alpha, 1, 0).unwrap();
    let p = store0.get_p(Spin::Alpha, 1, 0).unwrap();
    assert_abs_diff_eq!(p, h, epsilon = 1e-14);
    for tau in 0..2 {
        for a in 0..3 {
            for b in 0..3 {
                for c in 0..3 {
                    assert_abs_diff_eq!(pph[(tau, a, b, c)], phh[(tau, c, b, a)], epsilon = 1e-14);
                }
            }
        }
    }

    // Contracting the density-like pair of a phh amplitude over the α channel counts electrons:
    // Σ_r ⟨0|a†_{rα} a_{rα} a_{qα}|1⟩ = (nα - 1) h[q] with nα = 2.
    for q in 0..3 {
        let traced = (0..3).map(|r| phh[(0, r, r, q)]).sum::<f64>();
        assert_abs_diff_eq!(traced, h[q], epsilon = 1e-12);
        let traced_beta = (0..3).map(|r| phh[(1, r, r, q)]).sum::<f64>();
        assert_abs_diff_eq!(traced_beta, h[q], epsilon = 1e-12);
    }

    // Fragment 1 gains the α electron.
    let h1 = store1.get_h(Spin::Alpha, 1, 0).unwrap();
    assert_eq!(h1.len(), 1);
    assert!(store1.get_p(Spin::Alpha, 0, 1).is_ok());
}

#[test]
fn test_builder_rejects_mismatched_amplitude_lengths() {
    let mut system = two_fragment_system();
    let solver = DeterminantSolver::new(vec![]);
    // State 0 of fragment 0 lives in the (2, 1) sector of three orbitals, with nine determinants.
    let truncated = system.ci[0][0].slice(s![..7]).to_owned();
    system.ci[0][0] = truncated;
    let err = build_fragment_intermediates(0, 3, &solver, &system.ci[0], &system.hopping)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TdmError>(),
        Some(TdmError::MalformedInput(_))
    ));

    // Fragment 0 only watches an α pair hop from fragment 1 to fragment 2.
    let nelec_frs = vec![
        vec![(1, 1), (1, 1)],
        vec![(2, 0), (0, 0)],
        vec![(0, 0), (2, 0)],
    ];
    let hopping = HoppingIndex::new(&nelec_frs).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let ci0 = vec![random_ci(2, (1, 1), &mut rng), random_ci(2, (1, 1), &mut rng)];
    assert!(build_fragment_intermediates(0, 2, &solver, &ci0, &hopping).is_ok());
    let short = vec![ci0[0].clone(), ci0[1].slice(s![..2]).to_owned()];
    let err = build_fragment_intermediates(0, 2, &solver, &short, &hopping).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TdmError>(),
        Some(TdmError::MalformedInput(_))
    ));
}
