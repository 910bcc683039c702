//! Assembly of full-space transition density matrices from fragment intermediates.
//!
//! For a pair of product states `|b⟩ = B_0 ⋯ B_{F-1}|vac⟩` and `|k⟩ = K_0 ⋯ K_{F-1}|vac⟩`
//! and an operator string `O` whose factors act on fragments `f_1, …, f_m`,
//!
//! ```text
//! ⟨b|O|k⟩ = ε · Π_f ⟨b_f|O_f|k_f⟩,
//! ```
//!
//! where `O_f` collects the factors acting on fragment `f` in their original order and the
//! phase `ε` is determined by [`TdmAssembler::phase`]. Fragments not touched by `O` contribute
//! their local overlaps.
//!
//! Two-body elements are stored in Mulliken order,
//! `TDM2[b, k, στ, p, q, r, s] = ⟨b|a†_{pσ} a†_{rτ} a_{sτ} a_{qσ}|k⟩`.

use std::ops::Range;

use anyhow::{self, ensure, format_err};
use ndarray::{
    s, Array, Array2, Array4, Array5, ArrayD, ArrayViewMut3, ArrayViewMut4, ArrayViewMut5,
    ArrayViewMutD, Axis, Dimension, Ix4, Ix5, IxDyn,
};
use rayon::prelude::*;

use crate::auxiliary::scalar::{modulus, with_phase, TdmScalar};
use crate::auxiliary::spin::{spin_pair_index, PairChannel, Spin};
use crate::error::TdmError;
use crate::hopping::{Excitation, HoppingIndex};
use crate::intermediates::FragmentIntermediates;

mod rules;



/// Positions, in the operator string `a†_p a†_r a_s a_q`, of the Mulliken indices
/// `(p, q, r, s)`, listed in string order.
const DIRAC_ORDER: [usize; 4] = [0, 2, 3, 1];

/// Structure assembling transition density matrices from the intermediates of all fragments.
pub struct TdmAssembler<'a, T: TdmScalar> {
    hopping: &'a HoppingIndex,

    stores: &'a [FragmentIntermediates<T>],

    /// Cumulative orbital offsets; fragment `f` spans `offsets[f]..offsets[f + 1]`.
    offsets: Vec<usize>,

    antisymmetry_threshold: f64,
}

impl<'a, T: TdmScalar> TdmAssembler<'a, T> {
    /// Creates an assembler.
    ///
    /// # Arguments
    ///
    /// * `hopping` - The hopping index of all states.
    /// * `stores` - The intermediates of every fragment, in fragment order.
    /// * `antisymmetry_threshold` - The largest tolerated deviation of same-spin pair
    /// amplitudes from antisymmetry.
    pub fn new(
        hopping: &'a HoppingIndex,
        stores: &'a [FragmentIntermediates<T>],
        antisymmetry_threshold: f64,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            stores.len() == hopping.nfrags(),
            TdmError::MalformedInput(format!(
                "{} fragment stores supplied for {} fragments.",
                stores.len(),
                hopping.nfrags()
            ))
        );
        ensure!(
            stores.iter().enumerate().all(|(f, store)| store.frag() == f),
            TdmError::MalformedInput("Fragment stores are not in fragment order.".to_string())
        );
        let offsets = std::iter::once(0)
            .chain(stores.iter().scan(0, |acc, store| {
                *acc += store.norb();
                Some(*acc)
            }))
            .collect::<Vec<_>>();
        Ok(Self {
            hopping,
            stores,
            offsets,
            antisymmetry_threshold,
        })
    }

    /// The total number of orbitals.
    pub fn norb(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn nfrags(&self) -> usize {
        self.stores.len()
    }

    fn range(&self, frag: usize) -> Range<usize> {
        self.offsets[frag]..self.offsets[frag + 1]
    }

    /// Returns `true` if the phase of an operator string acting on `ket` is negative.
    ///
    /// # Arguments
    ///
    /// * `ket` - The ket state.
    /// * `frags` - The fragments of the operators, in string order.
    ///
    /// The phase is `(-1)^(n_inv + Σ_f [m_f odd] N_{<f})`, where `n_inv` is the number of
    /// transpositions needed to stably sort the operators by fragment, `m_f` the number of
    /// operators on fragment `f`, and `N_{<f}` the number of electrons of `ket` in fragments
    /// preceding `f`.
    pub fn phase(&self, ket: usize, frags: &[usize]) -> bool {
        let inversions = frags
            .iter()
            .enumerate()
            .map(|(a, fa)| frags[a + 1..].iter().filter(|fb| *fb < fa).count())
            .sum::<usize>();
        let crossings = (0..self.nfrags())
            .filter(|f| frags.iter().filter(|g| *g == f).count() % 2 == 1)
            .map(|f| {
                (0..f)
                    .map(|g| self.hopping.nelectrons(g, ket))
                    .sum::<usize>()
            })
            .sum::<usize>();
        (inversions + crossings) % 2 == 1
    }

    /// Returns the phase of a two-body element with Mulliken fragment pattern
    /// `[fp, fq, fr, fs]`.
    fn phase2(&self, ket: usize, frags: [usize; 4]) -> bool {
        self.phase(ket, &DIRAC_ORDER.map(|i| frags[i]))
    }

    /// Returns the product of the local overlaps of all fragments not in `involved`.
    fn spectator_factor(
        &self,
        bra: usize,
        ket: usize,
        involved: &[usize],
    ) -> Result<T, anyhow::Error> {
        self.stores
            .iter()
            .filter(|store| !involved.contains(&store.frag()))
            .try_fold(T::one(), |acc, store| {
                store.get_ovlp(bra, ket).map(|s| acc * s)
            })
    }

    /// Verifies that a same-spin pair amplitude is antisymmetric.
    fn check_antisymmetry(
        &self,
        frag: usize,
        bra: usize,
        ket: usize,
        channel: PairChannel,
        amplitude: &Array2<T>,
    ) -> Result<(), anyhow::Error> {
        if !channel.is_same_spin() {
            return Ok(());
        }
        let deviation = (amplitude + &amplitude.t())
            .iter()
            .map(|&x| modulus(x))
            .fold(0.0, f64::max);
        ensure!(
            deviation <= self.antisymmetry_threshold,
            TdmError::ConsistencyViolation {
                fragment: Some(frag),
                bra,
                ket,
                channel: channel.to_string(),
                deviation,
            }
        );
        Ok(())
    }

    /// Writes a one-body block of spin `spin` into the orbital ranges of fragments `(i, j)`.
    fn place_d1(
        &self,
        d1: &mut ArrayViewMut3<T>,
        spin: Spin,
        (i, j): (usize, usize),
        block: &Array2<T>,
    ) {
        d1.slice_mut(s![spin.index(), self.range(i), self.range(j)])
            .assign(block);
    }

    /// Writes a two-body block into the orbital ranges of fragments `[fp, fq, fr, fs]`
    /// together with its partners.
    ///
    /// The partner under exchange of the two electrons,
    /// `TDM2[σ₂σ₁][r, s, p, q] = TDM2[σ₁σ₂][p, q, r, s]`, is always written. For a same-spin
    /// block with `fq ≠ fs`, the block obtained by exchanging the two annihilators,
    /// `TDM2[σσ][p, s, r, q] = -TDM2[σσ][p, q, r, s]`, and its own electron-exchange partner are
    /// written too.
    fn place_d2(
        &self,
        d2: &mut ArrayViewMut5<T>,
        (s1, s2): (Spin, Spin),
        frags: [usize; 4],
        block: Array4<T>,
    ) {
        let [fp, fq, fr, fs] = frags;
        let mut blocks = Vec::with_capacity(2);
        if s1 == s2 && fq != fs {
            let exchanged = block.view().permuted_axes([0, 3, 2, 1]).mapv(|x| -x);
            blocks.push(([fp, fs, fr, fq], exchanged));
        }
        blocks.push((frags, block));
        for ([fp, fq, fr, fs], block) in blocks {
            d2.slice_mut(s![
                spin_pair_index(s1, s2),
                self.range(fp),
                self.range(fq),
                self.range(fr),
                self.range(fs)
            ])
            .assign(&block);
            d2.slice_mut(s![
                spin_pair_index(s2, s1),
                self.range(fr),
                self.range(fs),
                self.range(fp),
                self.range(fq)
            ])
            .assign(&block.view().permuted_axes([2, 3, 0, 1]));
        }
    }

    /// Computes the transition density matrices of one ordered pair of states.
    ///
    /// # Arguments
    ///
    /// * `bra` - The bra state.
    /// * `ket` - The ket state.
    /// * `d1` - The zero-initialised one-body block of the pair, of shape `(2, n, n)`.
    /// * `d2` - The zero-initialised two-body block of the pair, of shape `(4, n, n, n, n)`.
    pub fn crunch_pair(
        &self,
        bra: usize,
        ket: usize,
        mut d1: ArrayViewMut3<T>,
        mut d2: ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let excitation = self.hopping.classify(bra, ket)?;
        log::debug!("Pair ({bra}, {ket}): {excitation}.");
        match excitation {
            Excitation::Disconnected => Ok(()),
            Excitation::Null => self.crunch_null(bra, ket, &mut d1, &mut d2),
            Excitation::OneElectron { spin, dest, source } => {
                self.crunch_one_electron(bra, ket, spin, dest, source, &mut d1, &mut d2)
            }
            Excitation::SpinHop {
                alpha_dest,
                beta_dest,
            } => self.crunch_spin_hop(bra, ket, alpha_dest, beta_dest, &mut d2),
            Excitation::PairHop {
                channel,
                dest,
                source,
            } => self.crunch_pair_hop(bra, ket, channel, dest, source, &mut d2),
            Excitation::PairSplit {
                channel,
                source,
                dests,
            } => self.crunch_pair_split(bra, ket, channel, source, dests, &mut d2),
            Excitation::PairCoalesce {
                channel,
                dest,
                sources,
            } => self.crunch_pair_coalesce(bra, ket, channel, dest, sources, &mut d2),
            Excitation::SpinCoupledHop {
                flip,
                gains_alpha,
                alpha_partner,
                beta_partner,
            } => self.crunch_spin_coupled_hop(
                bra,
                ket,
                flip,
                gains_alpha,
                alpha_partner,
                beta_partner,
                &mut d2,
            ),
            Excitation::TwoElectron {
                channel,
                dests,
                sources,
            } => self.crunch_two_electron(bra, ket, channel, dests, sources, &mut d2),
        }
    }

    /// Allocates zero-filled output tensors of shapes `(R, R, 2, n, n)` and
    /// `(R, R, 4, n, n, n, n)`.
    pub fn allocate(&self) -> (Array5<T>, ArrayD<T>) {
        let (nroots, n) = (self.hopping.nroots(), self.norb());
        (
            Array5::zeros((nroots, nroots, 2, n, n)),
            ArrayD::zeros(IxDyn(&[nroots, nroots, 4, n, n, n, n])),
        )
    }

    /// Fills the blocks of every pair with `bra < ket`.
    pub fn assemble_upper(
        &self,
        tdm1: &mut Array5<T>,
        tdm2: &mut ArrayD<T>,
        parallel: bool,
    ) -> Result<(), anyhow::Error> {
        let nroots = self.hopping.nroots();
        for_each_bra_row(tdm1, tdm2, parallel, |bra, mut d1_row, mut d2_row| {
            for ket in (bra + 1)..nroots {
                let d1 = d1_row.index_axis_mut(Axis(0), ket);
                let d2 = d2_row
                    .index_axis_mut(Axis(0), ket)
                    .into_dimensionality::<Ix5>()?;
                self.crunch_pair(bra, ket, d1, d2)?;
            }
            Ok(())
        })
    }

    /// Completes the tensors from their upper triangles by writing the Hermitian conjugate of
    /// every pair `(b, k)` with `b < k` into `(k, b)`, then fills the diagonal pairs.
    ///
    /// The lower triangle must still be zero. Only one pair block is held in temporary storage
    /// at a time.
    pub fn complete(
        &self,
        tdm1: &mut Array5<T>,
        tdm2: &mut ArrayD<T>,
        parallel: bool,
    ) -> Result<(), anyhow::Error> {
        let nroots = self.hopping.nroots();
        for bra in 0..nroots {
            for ket in (bra + 1)..nroots {
                let adj1 = tdm1
                    .slice(s![bra, ket, .., .., ..])
                    .permuted_axes([0, 2, 1])
                    .mapv(|x| x.conj());
                tdm1.slice_mut(s![ket, bra, .., .., ..]).assign(&adj1);

                let adj2 = tdm2
                    .index_axis(Axis(0), bra)
                    .index_axis_move(Axis(0), ket)
                    .into_dimensionality::<Ix5>()?
                    .permuted_axes([0, 2, 1, 4, 3])
                    .mapv(|x| x.conj());
                tdm2.index_axis_mut(Axis(0), ket)
                    .index_axis_move(Axis(0), bra)
                    .into_dimensionality::<Ix5>()?
                    .assign(&adj2);
            }
        }

        for_each_bra_row(tdm1, tdm2, parallel, |state, mut d1_row, mut d2_row| {
            let d1 = d1_row.index_axis_mut(Axis(0), state);
            let d2 = d2_row
                .index_axis_mut(Axis(0), state)
                .into_dimensionality::<Ix5>()?;
            self.crunch_pair(state, state, d1, d2)
        })
    }
}

/// Applies a fallible function to the bra rows `(tdm1[b], tdm2[b])` of the output tensors,
/// optionally on the rayon thread pool.
fn for_each_bra_row<T, F>(
    tdm1: &mut Array5<T>,
    tdm2: &mut ArrayD<T>,
    parallel: bool,
    f: F,
) -> Result<(), anyhow::Error>
where
    T: TdmScalar,
    F: Fn(usize, ArrayViewMut4<T>, ArrayViewMutD<T>) -> Result<(), anyhow::Error> + Send + Sync,
{
    if parallel {
        tdm1.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(tdm2.axis_iter_mut(Axis(0)).into_par_iter())
            .enumerate()
            .try_for_each(|(bra, (d1_row, d2_row))| f(bra, d1_row, d2_row))
    } else {
        tdm1.axis_iter_mut(Axis(0))
            .zip(tdm2.axis_iter_mut(Axis(0)))
            .enumerate()
            .try_for_each(|(bra, (d1_row, d2_row))| f(bra, d1_row, d2_row))
    }
}

/// Converts the output of an `einsum` contraction into a four-index block.
fn into_block4<T: TdmScalar>(
    contraction: Result<ArrayD<T>, &'static str>,
) -> Result<Array4<T>, anyhow::Error> {
    contraction
        .map_err(|err| format_err!(err))?
        .into_dimensionality::<Ix4>()
        .map_err(|err| format_err!(err))
}

/// Scales a block by a scalar and a fermionic phase.
fn scaled<T: TdmScalar, D: Dimension>(
    block: Array<T, D>,
    factor: T,
    negative: bool,
) -> Array<T, D> {
    let factor = with_phase(factor, negative);
    block.mapv_into(|x| x * factor)
}

/// Verifies that the finished tensors are Hermitian under exchange of bra and ket.
///
/// # Errors
///
/// Errors with [`TdmError::ConsistencyViolation`] naming the first offending pair.
pub fn check_hermiticity<T: TdmScalar>(
    tdm1: &Array5<T>,
    tdm2: &ArrayD<T>,
    threshold: f64,
) -> Result<(), anyhow::Error> {
    let nroots = tdm1.len_of(Axis(0));
    let pair_d2 = |bra: usize, ket: usize| {
        tdm2.index_axis(Axis(0), bra)
            .index_axis_move(Axis(0), ket)
            .into_dimensionality::<Ix5>()
    };
    for bra in 0..nroots {
        for ket in bra..nroots {
            let d1_bk = tdm1.slice(s![bra, ket, .., .., ..]);
            let d1_kb = tdm1.slice(s![ket, bra, .., .., ..]);
            let dev1 = d1_bk
                .iter()
                .zip(d1_kb.permuted_axes([0, 2, 1]).iter())
                .map(|(&a, &b)| modulus(a - b.conj()))
                .fold(0.0, f64::max);
            let d2_bk = pair_d2(bra, ket)?;
            let d2_kb = pair_d2(ket, bra)?;
            let dev2 = d2_bk
                .iter()
                .zip(d2_kb.permuted_axes([0, 2, 1, 4, 3]).iter())
                .map(|(&a, &b)| modulus(a - b.conj()))
                .fold(0.0, f64::max);
            let deviation = dev1.max(dev2);
            ensure!(
                deviation <= threshold,
                TdmError::ConsistencyViolation {
                    fragment: None,
                    bra,
                    ket,
                    channel: "all".to_string(),
                    deviation,
                }
            );
        }
    }
    Ok(())
}
