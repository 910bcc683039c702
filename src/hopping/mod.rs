//! Classification of the electron hops between pairs of multi-fragment basis states.

use std::fmt;

use anyhow::{self, ensure, format_err};
use ndarray::{Array3, Array4, Axis};

use crate::auxiliary::spin::{PairChannel, Spin};
use crate::error::TdmError;
use crate::solver::Sector;

#[cfg(test)]
#[path = "hopping_tests.rs"]
mod hopping_tests;

// ==================
// Struct definitions
// ==================

/// Structure holding the per-fragment, per-spin electron-count differences between every pair of
/// basis states.
///
/// Entry `[f, σ, b, k]` of the hopping tensor is the number of spin-`σ` electrons in fragment
/// `f` of state `b` minus that of state `k`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HoppingIndex {
    /// Electron counts, of shape `(nfrags, nroots, 2)`.
    nelec_frs: Array3<i64>,

    /// The hopping tensor, of shape `(nfrags, 2, nroots, nroots)`.
    hopping: Array4<i64>,
}

/// An enumerated type for the topologies of electron transfer between two basis states.
///
/// Fragment indices in the variants refer to the roles of fragments in the excitation from the
/// ket to the bra: a *destination* gains electrons in the bra, a *source* loses them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Excitation {
    /// Variant for pairs that either do not conserve the number of electrons of each spin or
    /// differ by more than two electrons. Their transition density matrices vanish.
    Disconnected,

    /// Variant for pairs with identical electron counts in every fragment.
    Null,

    /// Variant for a single electron moving between two fragments.
    OneElectron {
        /// The spin of the moving electron.
        spin: Spin,

        /// The fragment receiving the electron.
        dest: usize,

        /// The fragment losing the electron.
        source: usize,
    },

    /// Variant for an α electron and a β electron swapping fragments.
    SpinHop {
        /// The fragment gaining an α electron and losing a β electron.
        alpha_dest: usize,

        /// The fragment gaining a β electron and losing an α electron.
        beta_dest: usize,
    },

    /// Variant for two electrons moving together between the same two fragments.
    PairHop {
        /// The spin channel of the pair.
        channel: PairChannel,

        /// The fragment receiving the pair.
        dest: usize,

        /// The fragment losing the pair.
        source: usize,
    },

    /// Variant for a pair leaving one fragment and separating into two other fragments.
    PairSplit {
        /// The spin channel of the pair.
        channel: PairChannel,

        /// The fragment losing the pair.
        source: usize,

        /// The fragments receiving the two electrons. For [`PairChannel::AlphaBeta`], these are
        /// the α and β destinations, in that order; otherwise they are in ascending order.
        dests: [usize; 2],
    },

    /// Variant for electrons from two fragments coalescing into a pair on a third fragment.
    PairCoalesce {
        /// The spin channel of the pair.
        channel: PairChannel,

        /// The fragment receiving the pair.
        dest: usize,

        /// The fragments losing the two electrons. For [`PairChannel::AlphaBeta`], these are
        /// the α and β sources, in that order; otherwise they are in ascending order.
        sources: [usize; 2],
    },

    /// Variant for one fragment exchanging an electron of one spin for one of the opposite
    /// spin, while the two electrons are respectively supplied by and delivered to two other
    /// fragments.
    SpinCoupledHop {
        /// The fragment whose net electron count is unchanged but whose spin flips.
        flip: usize,

        /// `true` if the flipping fragment gains an α electron and loses a β electron.
        gains_alpha: bool,

        /// The other fragment exchanging an α electron.
        alpha_partner: usize,

        /// The other fragment exchanging a β electron.
        beta_partner: usize,
    },

    /// Variant for two electrons leaving two fragments and arriving at two further fragments.
    TwoElectron {
        /// The spin channel of the pair of moving electrons.
        channel: PairChannel,

        /// The destinations, with the same ordering convention as [`Excitation::PairSplit`].
        dests: [usize; 2],

        /// The sources, with the same ordering convention as [`Excitation::PairCoalesce`].
        sources: [usize; 2],
    },
}

impl fmt::Display for Excitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Excitation::Disconnected => write!(f, "disconnected"),
            Excitation::Null => write!(f, "null"),
            Excitation::OneElectron { spin, dest, source } => {
                write!(f, "one-electron {spin} hop {source} → {dest}")
            }
            Excitation::SpinHop {
                alpha_dest,
                beta_dest,
            } => write!(f, "spin hop α → {alpha_dest}, β → {beta_dest}"),
            Excitation::PairHop {
                channel,
                dest,
                source,
            } => write!(f, "{channel} pair hop {source} → {dest}"),
            Excitation::PairSplit {
                channel,
                source,
                dests,
            } => write!(f, "{channel} pair split {source} → {dests:?}"),
            Excitation::PairCoalesce {
                channel,
                dest,
                sources,
            } => write!(f, "{channel} pair coalescence {sources:?} → {dest}"),
            Excitation::SpinCoupledHop { flip, .. } => {
                write!(f, "spin-coupled hop through fragment {flip}")
            }
            Excitation::TwoElectron {
                channel,
                dests,
                sources,
            } => write!(f, "{channel} two-electron hop {sources:?} → {dests:?}"),
        }
    }
}

// =====================
// Implementation blocks
// =====================

impl HoppingIndex {
    /// Constructs the hopping index from per-fragment, per-state electron counts.
    ///
    /// # Arguments
    ///
    /// * `nelec_frs` - `nelec_frs[f][r]` gives the `(nα, nβ)` electron counts of fragment `f`
    /// in state `r`.
    ///
    /// # Errors
    ///
    /// Errors if there are no fragments or if fragments list different numbers of states.
    pub fn new(nelec_frs: &[Vec<Sector>]) -> Result<Self, anyhow::Error> {
        let nfrags = nelec_frs.len();
        ensure!(
            nfrags > 0,
            TdmError::MalformedInput("At least one fragment is required.".to_string())
        );
        let nroots = nelec_frs[0].len();
        ensure!(
            nelec_frs.iter().all(|frag| frag.len() == nroots),
            TdmError::MalformedInput(
                "All fragments must list electron counts for the same number of states."
                    .to_string()
            )
        );

        let mut counts = Array3::<i64>::zeros((nfrags, nroots, 2));
        for (f, frag) in nelec_frs.iter().enumerate() {
            for (r, &(na, nb)) in frag.iter().enumerate() {
                counts[(f, r, 0)] = i64::try_from(na)?;
                counts[(f, r, 1)] = i64::try_from(nb)?;
            }
        }

        let mut hopping = Array4::<i64>::zeros((nfrags, 2, nroots, nroots));
        for f in 0..nfrags {
            for s in 0..2 {
                for b in 0..nroots {
                    for k in 0..nroots {
                        hopping[(f, s, b, k)] = counts[(f, b, s)] - counts[(f, k, s)];
                    }
                }
            }
        }

        Ok(Self {
            nelec_frs: counts,
            hopping,
        })
    }

    /// The number of fragments.
    pub fn nfrags(&self) -> usize {
        self.hopping.len_of(Axis(0))
    }

    /// The number of basis states.
    pub fn nroots(&self) -> usize {
        self.hopping.len_of(Axis(2))
    }

    /// The hopping tensor, of shape `(nfrags, 2, nroots, nroots)`.
    pub fn tensor(&self) -> &Array4<i64> {
        &self.hopping
    }

    /// Returns the `(nα, nβ)` electron counts of a fragment in a state.
    pub fn nelec(&self, frag: usize, state: usize) -> Sector {
        (
            self.nelec_frs[(frag, state, 0)] as usize,
            self.nelec_frs[(frag, state, 1)] as usize,
        )
    }

    /// Returns the total number of electrons of a fragment in a state.
    pub fn nelectrons(&self, frag: usize, state: usize) -> usize {
        let (na, nb) = self.nelec(frag, state);
        na + nb
    }

    /// Returns the aggregate `(nα, nβ)` electron counts of a state over all fragments.
    pub fn total_nelec(&self, state: usize) -> Sector {
        (0..self.nfrags()).fold((0, 0), |(na, nb), f| {
            let (fa, fb) = self.nelec(f, state);
            (na + fa, nb + fb)
        })
    }

    /// Returns the hop of spin-`spin` electrons at a fragment from `ket` to `bra`.
    pub fn hop(&self, frag: usize, spin: Spin, bra: usize, ket: usize) -> i64 {
        self.hopping[(frag, spin.index(), bra, ket)]
    }

    /// Returns the `(α, β)` hops at a fragment from `ket` to `bra`.
    pub fn frag_hop(&self, frag: usize, bra: usize, ket: usize) -> (i64, i64) {
        (
            self.hopping[(frag, 0, bra, ket)],
            self.hopping[(frag, 1, bra, ket)],
        )
    }

    /// Returns the `(α, β)` hops of all fragments from `ket` to `bra`.
    pub fn hops(&self, bra: usize, ket: usize) -> Vec<(i64, i64)> {
        (0..self.nfrags())
            .map(|f| self.frag_hop(f, bra, ket))
            .collect()
    }

    /// Returns `true` if both states have the same total number of electrons of each spin.
    pub fn is_conserving(&self, bra: usize, ket: usize) -> bool {
        Spin::ALL.iter().all(|spin| {
            (0..self.nfrags())
                .map(|f| self.hop(f, *spin, bra, ket))
                .sum::<i64>()
                == 0
        })
    }

    /// The number of second-quantised operators needed to connect the two states, i.e. the
    /// total absolute hop over all fragments and spins.
    pub fn op_count(&self, bra: usize, ket: usize) -> usize {
        self.hops(bra, ket)
            .iter()
            .map(|(a, b)| (a.abs() + b.abs()) as usize)
            .sum()
    }

    /// The number of fragments whose net electron count changes.
    pub fn charge_count(&self, bra: usize, ket: usize) -> usize {
        self.hops(bra, ket)
            .iter()
            .filter(|(a, b)| a + b != 0)
            .count()
    }

    /// The number of fragments with any nonzero hop.
    pub fn frag_count(&self, bra: usize, ket: usize) -> usize {
        self.hops(bra, ket)
            .iter()
            .filter(|(a, b)| *a != 0 || *b != 0)
            .count()
    }

    /// Half the total absolute β hop, which identifies the spin channel of a two-electron
    /// excitation (0 for αα, 1 for αβ, 2 for ββ).
    pub fn spin_channel(&self, bra: usize, ket: usize) -> usize {
        let nbeta = (0..self.nfrags())
            .map(|f| self.hop(f, Spin::Beta, bra, ket).unsigned_abs() as usize)
            .sum::<usize>();
        nbeta / 2
    }

    /// Returns `true` if the pair can have nonvanishing transition density matrices.
    pub fn is_interacting(&self, bra: usize, ket: usize) -> bool {
        self.is_conserving(bra, ket) && self.op_count(bra, ket) <= 4
    }

    /// Classifies the excitation connecting `ket` to `bra`.
    ///
    /// # Errors
    ///
    /// Errors with [`TdmError::UnsupportedExcitationPattern`] if an interacting pair has a
    /// topology with no assembly rule.
    pub fn classify(&self, bra: usize, ket: usize) -> Result<Excitation, anyhow::Error> {
        if !self.is_interacting(bra, ket) {
            return Ok(Excitation::Disconnected);
        }
        let hops = self.hops(bra, ket);
        let unsupported = || {
            format_err!(TdmError::UnsupportedExcitationPattern {
                bra,
                ket,
                fragment: None,
                hops: hops.clone(),
            })
        };
        let find = |pred: &dyn Fn((i64, i64)) -> bool| {
            hops.iter()
                .position(|&h| pred(h))
                .ok_or_else(unsupported)
        };
        let counts = (
            self.op_count(bra, ket),
            self.charge_count(bra, ket),
            self.frag_count(bra, ket),
        );
        let channel = || {
            PairChannel::from_beta_count(self.spin_channel(bra, ket)).ok_or_else(unsupported)
        };

        let excitation = match counts {
            (0, _, _) => Excitation::Null,
            (2, _, _) => {
                let spin = if hops.iter().any(|&(a, _)| a != 0) {
                    Spin::Alpha
                } else {
                    Spin::Beta
                };
                Excitation::OneElectron {
                    spin,
                    dest: find(&|h| spin.pick(h) == 1)?,
                    source: find(&|h| spin.pick(h) == -1)?,
                }
            }
            (4, 0, 2) => Excitation::SpinHop {
                alpha_dest: find(&|h| h == (1, -1))?,
                beta_dest: find(&|h| h == (-1, 1))?,
            },
            (4, 2, 2) => Excitation::PairHop {
                channel: channel()?,
                dest: find(&|(a, b)| a + b == 2)?,
                source: find(&|(a, b)| a + b == -2)?,
            },
            (4, 2, 3) => {
                let flip = find(&|(a, b)| a != 0 && a + b == 0)?;
                let gains_alpha = hops[flip].0 == 1;
                let partner = |spin: Spin| {
                    (0..hops.len())
                        .find(|&f| f != flip && spin.pick(hops[f]) != 0)
                        .ok_or_else(unsupported)
                };
                Excitation::SpinCoupledHop {
                    flip,
                    gains_alpha,
                    alpha_partner: partner(Spin::Alpha)?,
                    beta_partner: partner(Spin::Beta)?,
                }
            }
            (4, 3, 3) => {
                let channel = channel()?;
                let (s1, s2) = channel.spins();
                if let Ok(source) = find(&|(a, b)| a + b == -2) {
                    Excitation::PairSplit {
                        channel,
                        source,
                        dests: self.ordered_pair(&hops, channel, (s1, 1), (s2, 1))?,
                    }
                } else {
                    Excitation::PairCoalesce {
                        channel,
                        dest: find(&|(a, b)| a + b == 2)?,
                        sources: self.ordered_pair(&hops, channel, (s1, -1), (s2, -1))?,
                    }
                }
            }
            (4, 4, 4) => {
                let channel = channel()?;
                let (s1, s2) = channel.spins();
                Excitation::TwoElectron {
                    channel,
                    dests: self.ordered_pair(&hops, channel, (s1, 1), (s2, 1))?,
                    sources: self.ordered_pair(&hops, channel, (s1, -1), (s2, -1))?,
                }
            }
            _ => return Err(unsupported()),
        };
        Ok(excitation)
    }

    /// Locates the two distinct fragments with single-electron hops of the requested signs.
    ///
    /// For a same-spin channel the two fragments are returned in ascending order; for the αβ
    /// channel the fragment hopping in the first spin comes first.
    fn ordered_pair(
        &self,
        hops: &[(i64, i64)],
        channel: PairChannel,
        first: (Spin, i64),
        second: (Spin, i64),
    ) -> Result<[usize; 2], anyhow::Error> {
        let singles = |(spin, sign): (Spin, i64)| {
            hops.iter()
                .enumerate()
                .filter_map(|(f, &h)| {
                    (spin.pick(h) == sign && (h.0 + h.1).abs() == 1).then_some(f)
                })
                .collect::<Vec<_>>()
        };
        let pair = if channel.is_same_spin() {
            match singles(first).as_slice() {
                &[f1, f2] => Some([f1, f2]),
                _ => None,
            }
        } else {
            match (singles(first).as_slice(), singles(second).as_slice()) {
                (&[f1], &[f2]) if f1 != f2 => Some([f1, f2]),
                _ => None,
            }
        };
        pair.ok_or_else(|| {
            format_err!(
                "Unable to locate the single-electron partners of a {channel} excitation in hops {hops:?}."
            )
        })
    }
}
