use proptest::prelude::*;

use crate::auxiliary::spin::{PairChannel, Spin};
use crate::error::TdmError;
use crate::hopping::{Excitation, HoppingIndex};

/// Builds a hopping index from per-state lists of per-fragment counts.
fn index_from_states(states: &[Vec<(usize, usize)>]) -> HoppingIndex {
    let nfrags = states[0].len();
    let nelec_frs = (0..nfrags)
        .map(|f| states.iter().map(|state| state[f]).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    HoppingIndex::new(&nelec_frs).unwrap()
}

#[test]
fn test_hopping_tensor_entries() {
    let index = index_from_states(&[vec![(1, 0), (0, 1)], vec![(0, 0), (1, 1)]]);
    assert_eq!(index.nfrags(), 2);
    assert_eq!(index.nroots(), 2);
    assert_eq!(index.tensor().shape(), &[2, 2, 2, 2]);
    assert_eq!(index.hop(0, Spin::Alpha, 0, 1), 1);
    assert_eq!(index.hop(1, Spin::Alpha, 0, 1), -1);
    assert_eq!(index.hop(1, Spin::Alpha, 1, 0), 1);
    assert_eq!(index.frag_hop(1, 0, 1), (-1, 0));
    assert_eq!(index.total_nelec(0), (1, 1));
    assert_eq!(index.total_nelec(1), (1, 1));
    assert_eq!(index.nelectrons(1, 1), 2);
    assert!(index.is_conserving(0, 1));
    assert_eq!(index.op_count(0, 1), 2);
    assert_eq!(index.frag_count(0, 1), 2);
    assert_eq!(index.charge_count(0, 1), 2);
}

#[test]
fn test_hopping_malformed_input() {
    let err = HoppingIndex::new(&[vec![(1, 0)], vec![(1, 0), (0, 0)]]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TdmError>(),
        Some(TdmError::MalformedInput(_))
    ));
    assert!(HoppingIndex::new(&[]).is_err());
}

#[test]
fn test_hopping_classification_two_fragments() {
    let index = index_from_states(&[
        vec![(1, 0), (0, 1)],
        vec![(1, 1), (0, 0)],
        vec![(0, 0), (1, 1)],
        vec![(0, 1), (1, 0)],
        vec![(1, 0), (1, 0)],
    ]);
    assert_eq!(index.classify(0, 0).unwrap(), Excitation::Null);
    assert_eq!(
        index.classify(1, 0).unwrap(),
        Excitation::OneElectron {
            spin: Spin::Beta,
            dest: 0,
            source: 1
        }
    );
    assert_eq!(
        index.classify(1, 2).unwrap(),
        Excitation::PairHop {
            channel: PairChannel::AlphaBeta,
            dest: 0,
            source: 1
        }
    );
    assert_eq!(index.spin_channel(1, 2), 1);
    assert_eq!(
        index.classify(0, 3).unwrap(),
        Excitation::SpinHop {
            alpha_dest: 0,
            beta_dest: 1
        }
    );
    assert_eq!(index.charge_count(0, 3), 0);
    assert_eq!(index.op_count(0, 3), 4);
    assert!(!index.is_conserving(4, 0));
    assert_eq!(index.classify(4, 0).unwrap(), Excitation::Disconnected);
}

#[test]
fn test_hopping_classification_three_and_four_fragments() {
    let index = index_from_states(&[
        vec![(1, 1), (0, 0), (0, 0)],
        vec![(0, 0), (1, 0), (0, 1)],
        vec![(1, 0), (0, 1), (0, 0)],
        vec![(2, 0), (0, 0), (0, 0)],
        vec![(0, 0), (1, 0), (1, 0)],
    ]);
    assert_eq!(
        index.classify(1, 0).unwrap(),
        Excitation::PairSplit {
            channel: PairChannel::AlphaBeta,
            source: 0,
            dests: [1, 2]
        }
    );
    assert_eq!(
        index.classify(0, 1).unwrap(),
        Excitation::PairCoalesce {
            channel: PairChannel::AlphaBeta,
            dest: 0,
            sources: [1, 2]
        }
    );
    assert_eq!(
        index.classify(4, 3).unwrap(),
        Excitation::PairSplit {
            channel: PairChannel::AlphaAlpha,
            source: 0,
            dests: [1, 2]
        }
    );
    // Fragment 1 trades a β for an α electron; fragment 0 supplies the α, fragment 2 takes the β.
    assert_eq!(
        index.classify(1, 2).unwrap(),
        Excitation::SpinCoupledHop {
            flip: 1,
            gains_alpha: true,
            alpha_partner: 0,
            beta_partner: 2
        }
    );
    assert_eq!(
        index.classify(2, 1).unwrap(),
        Excitation::SpinCoupledHop {
            flip: 1,
            gains_alpha: false,
            alpha_partner: 0,
            beta_partner: 2
        }
    );

    let four = index_from_states(&[
        vec![(1, 0), (0, 1), (0, 0), (0, 0)],
        vec![(0, 0), (0, 0), (1, 0), (0, 1)],
        vec![(1, 0), (1, 0), (0, 0), (0, 0)],
        vec![(0, 0), (0, 0), (1, 0), (1, 0)],
    ]);
    assert_eq!(
        four.classify(1, 0).unwrap(),
        Excitation::TwoElectron {
            channel: PairChannel::AlphaBeta,
            dests: [2, 3],
            sources: [0, 1]
        }
    );
    assert_eq!(
        four.classify(2, 3).unwrap(),
        Excitation::TwoElectron {
            channel: PairChannel::AlphaAlpha,
            dests: [0, 1],
            sources: [2, 3]
        }
    );
}

#[test]
fn test_hopping_higher_order_pairs_are_disconnected() {
    let index = index_from_states(&[vec![(2, 1), (0, 0)], vec![(0, 0), (2, 1)]]);
    assert!(index.is_conserving(0, 1));
    assert_eq!(index.op_count(0, 1), 6);
    assert!(!index.is_interacting(0, 1));
    assert_eq!(index.classify(0, 1).unwrap(), Excitation::Disconnected);
}

proptest! {
    #[test]
    fn prop_hopping_antisymmetric_and_classifiable(
        nelec_frs in prop::collection::vec(
            prop::collection::vec((0usize..3, 0usize..3), 4),
            1..5,
        )
    ) {
        let index = HoppingIndex::new(&nelec_frs).unwrap();
        for bra in 0..4 {
            for ket in 0..4 {
                for f in 0..index.nfrags() {
                    let (a, b) = index.frag_hop(f, bra, ket);
                    prop_assert_eq!(index.frag_hop(f, ket, bra), (-a, -b));
                }
                prop_assert_eq!(index.op_count(bra, ket), index.op_count(ket, bra));
                if index.is_conserving(bra, ket) {
                    prop_assert_eq!(index.op_count(bra, ket) % 2, 0);
                    prop_assert_eq!(index.total_nelec(bra), index.total_nelec(ket));
                }
                // Every interacting pair has an assembly rule.
                let excitation = index.classify(bra, ket);
                prop_assert!(excitation.is_ok());
                if bra == ket {
                    prop_assert_eq!(excitation.unwrap(), Excitation::Null);
                }
            }
        }
    }
}
