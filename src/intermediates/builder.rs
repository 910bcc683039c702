//! Population of the fragment intermediate stores.

use std::collections::HashMap;

use anyhow::{self, bail, ensure, format_err};
use ndarray::{stack, Array1, Array2, Array4, ArrayView1, Axis};

use crate::auxiliary::scalar::TdmScalar;
use crate::auxiliary::spin::{PairChannel, Spin};
use crate::error::TdmError;
use crate::hopping::HoppingIndex;
use crate::intermediates::{FragmentIntermediates, LowerPair};
use crate::solver::{sector_without, FragmentSolver, Sector};

#[cfg(test)]
#[path = "builder_tests.rs"]
mod builder_tests;

/// Structure managing the construction of the intermediates of one fragment.
///
/// The builder visits every interacting pair of states once. Vectors with one electron removed
/// from a state are memoised per `(state, spin)` for the duration of one build and dropped with
/// the builder.
pub struct FragmentIntermediatesBuilder<'a, T, S>
where
    T: TdmScalar,
    S: FragmentSolver<T>,
{
    frag: usize,

    norb: usize,

    solver: &'a S,

    /// The amplitude vectors of this fragment for every state.
    ci: &'a [Array1<T>],

    hopping: &'a HoppingIndex,

    /// Memoised `a_{xσ}|state⟩`, stacked along the first axis over `x`.
    removed: HashMap<(usize, Spin), Array2<T>>,

    tables: HashMap<Sector, S::IndexTable>,

    store: FragmentIntermediates<T>,
}

impl<'a, T, S> FragmentIntermediatesBuilder<'a, T, S>
where
    T: TdmScalar,
    S: FragmentSolver<T>,
{
    /// Creates a builder for one fragment.
    ///
    /// # Arguments
    ///
    /// * `frag` - The index of the fragment.
    /// * `norb` - The number of orbitals in the fragment.
    /// * `solver` - The solver of the fragment.
    /// * `ci` - The amplitude vectors of the fragment, one per state.
    /// * `hopping` - The hopping index of all states.
    pub fn new(
        frag: usize,
        norb: usize,
        solver: &'a S,
        ci: &'a [Array1<T>],
        hopping: &'a HoppingIndex,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            frag < hopping.nfrags(),
            TdmError::MalformedInput(format!(
                "Fragment {frag} is out of range for {} fragments.",
                hopping.nfrags()
            ))
        );
        ensure!(
            ci.len() == hopping.nroots(),
            TdmError::MalformedInput(format!(
                "Fragment {frag} has {} amplitude vectors but there are {} states.",
                ci.len(),
                hopping.nroots()
            ))
        );
        for (state, vec) in ci.iter().enumerate() {
            let nelec = hopping.nelec(frag, state);
            let dim = solver.sector_dim(norb, nelec)?;
            ensure!(
                vec.len() == dim,
                TdmError::MalformedInput(format!(
                    "State {state} of fragment {frag} has {} amplitudes, but its {nelec:?} sector has {dim} determinants.",
                    vec.len()
                ))
            );
        }
        Ok(Self {
            frag,
            norb,
            solver,
            ci,
            hopping,
            removed: HashMap::new(),
            tables: HashMap::new(),
            store: FragmentIntermediates::new(frag, norb),
        })
    }

    /// Populates and returns the store of this fragment.
    pub fn build(mut self) -> Result<FragmentIntermediates<T>, anyhow::Error> {
        let nroots = self.hopping.nroots();
        for ket in 0..nroots {
            for bra in 0..nroots {
                if !self.hopping.is_interacting(bra, ket) {
                    continue;
                }
                match self.hopping.frag_hop(self.frag, bra, ket) {
                    (0, 0) => {
                        if let Some(pair) = LowerPair::new(bra, ket) {
                            self.spectator(pair)?;
                        }
                    }
                    (-1, 0) => self.one_hole(Spin::Alpha, bra, ket)?,
                    (0, -1) => self.one_hole(Spin::Beta, bra, ket)?,
                    (-1, 1) => self.spin_lowering(bra, ket)?,
                    (-1, -1) => self.two_holes(PairChannel::AlphaBeta, bra, ket)?,
                    (-2, 0) => self.two_holes(PairChannel::AlphaAlpha, bra, ket)?,
                    (0, -2) => self.two_holes(PairChannel::BetaBeta, bra, ket)?,
                    // Served by the adjoint accessors from the reverse orientation.
                    (1, 0) | (0, 1) | (1, -1) | (1, 1) | (2, 0) | (0, 2) => {}
                    _ => bail!(TdmError::UnsupportedExcitationPattern {
                        bra,
                        ket,
                        fragment: Some(self.frag),
                        hops: self.hopping.hops(bra, ket),
                    }),
                }
            }
        }
        log::debug!(
            "Fragment {}: {} intermediates cached from {} memoised hole vectors.",
            self.frag,
            self.store.len(),
            self.removed.len()
        );
        Ok(self.store)
    }

    fn nelec(&self, state: usize) -> Sector {
        self.hopping.nelec(self.frag, state)
    }

    /// Returns `⟨bra|v⟩` for a vector `v` in the sector of `bra`.
    fn braket(&self, bra: usize, v: ArrayView1<T>) -> T {
        self.ci[bra]
            .iter()
            .zip(v.iter())
            .fold(T::zero(), |acc, (&b, &k)| acc + b.conj() * k)
    }

    fn ensure_table(&mut self, nelec: Sector) -> Result<(), anyhow::Error> {
        if !self.tables.contains_key(&nelec) {
            let table = self.solver.index_table(self.norb, nelec)?;
            self.tables.insert(nelec, table);
        }
        Ok(())
    }

    /// Builds and memoises `a_{xσ}|state⟩` for every orbital `x` of the fragment.
    fn ensure_removed(&mut self, state: usize, spin: Spin) -> Result<(), anyhow::Error> {
        if self.removed.contains_key(&(state, spin)) {
            return Ok(());
        }
        let nelec = self.nelec(state);
        let rows = (0..self.norb)
            .map(|x| {
                self.solver
                    .annihilate(self.ci[state].view(), self.norb, nelec, spin, x)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let views = rows.iter().map(|row| row.view()).collect::<Vec<_>>();
        let stacked = stack(Axis(0), &views).map_err(|err| format_err!(err))?;
        self.removed.insert((state, spin), stacked);
        Ok(())
    }

    fn removed(&self, state: usize, spin: Spin) -> Result<&Array2<T>, anyhow::Error> {
        self.removed.get(&(state, spin)).ok_or_else(|| {
            format_err!(
                "Hole vectors of state {state} for spin {spin} have not been built in fragment {}.",
                self.frag
            )
        })
    }

    /// Caches the overlap and, depending on the excitation order of the pair, the local one-
    /// and two-body densities of a pair with no hop in this fragment.
    fn spectator(&mut self, pair: LowerPair) -> Result<(), anyhow::Error> {
        let (bra, ket) = (pair.bra(), pair.ket());
        let ovlp = self.braket(bra, self.ci[ket].view());
        self.store.insert_ovlp(pair, ovlp);

        let op_count = self.hopping.op_count(bra, ket);
        if op_count > 2 {
            return Ok(());
        }
        let nelec = self.nelec(ket);
        self.ensure_table(nelec)?;
        let table = self
            .tables
            .get(&nelec)
            .ok_or_else(|| format_err!("Missing index table for sector {nelec:?}."))?;
        let (bra_ci, ket_ci) = (self.ci[bra].view(), self.ci[ket].view());
        if op_count == 0 {
            let (dm1, dm2) = self
                .solver
                .trans_rdm12s(bra_ci, ket_ci, self.norb, nelec, table)?;
            self.store.insert_dm1(pair, dm1);
            self.store.insert_dm2(pair, dm2);
        } else {
            let dm1 = self
                .solver
                .trans_rdm1s(bra_ci, ket_ci, self.norb, nelec, table)?;
            self.store.insert_dm1(pair, dm1);
        }
        Ok(())
    }

    /// Caches `h[σ](bra, ket)` and, for a single hop, `phh[σ](bra, ket)`, where `bra` has one
    /// fewer `σ` electron in this fragment.
    fn one_hole(&mut self, spin: Spin, bra: usize, ket: usize) -> Result<(), anyhow::Error> {
        self.ensure_removed(ket, spin)?;
        let h = {
            let rows = self.removed(ket, spin)?;
            Array1::from_iter(rows.outer_iter().map(|row| self.braket(bra, row)))
        };
        self.store.insert_h(spin, bra, ket, h);

        if self.hopping.op_count(bra, ket) != 2 {
            return Ok(());
        }
        let nelec = self.nelec(bra);
        self.ensure_table(nelec)?;
        let table = self
            .tables
            .get(&nelec)
            .ok_or_else(|| format_err!("Missing index table for sector {nelec:?}."))?;
        let rows = self.removed(ket, spin)?;
        let mut phh = Array4::<T>::zeros((2, self.norb, self.norb, self.norb));
        for (q, row) in rows.outer_iter().enumerate() {
            let dm1 = self
                .solver
                .trans_rdm1s(self.ci[bra].view(), row, self.norb, nelec, table)?;
            phh.index_axis_mut(Axis(3), q).assign(&dm1);
        }
        self.store.insert_phh(spin, bra, ket, phh);
        Ok(())
    }

    /// Caches `sm(bra, ket)[x, y] = ⟨a_{xβ} bra|a_{yα} ket⟩`.
    fn spin_lowering(&mut self, bra: usize, ket: usize) -> Result<(), anyhow::Error> {
        self.ensure_removed(ket, Spin::Alpha)?;
        self.ensure_removed(bra, Spin::Beta)?;
        let bra_rows = self.removed(bra, Spin::Beta)?;
        let ket_rows = self.removed(ket, Spin::Alpha)?;
        let sm = bra_rows.mapv(|x| x.conj()).dot(&ket_rows.t());
        self.store.insert_sm(bra, ket, sm);
        Ok(())
    }

    /// Caches `hh(bra, ket)[x, y] = ⟨bra|a_{xσ₁} a_{yσ₂}|ket⟩`.
    ///
    /// Same-spin amplitudes are evaluated on the strict upper triangle and antisymmetrised.
    fn two_holes(
        &mut self,
        channel: PairChannel,
        bra: usize,
        ket: usize,
    ) -> Result<(), anyhow::Error> {
        let (s1, s2) = channel.spins();
        self.ensure_removed(ket, s1)?;
        let once = sector_without(self.nelec(ket), s1).ok_or_else(|| {
            format_err!(
                "State {ket} has no {s1} electron in fragment {} to remove.",
                self.frag
            )
        })?;
        let rows = self.removed(ket, s1)?;
        let norb = self.norb;
        let mut hh = Array2::<T>::zeros((norb, norb));
        if channel.is_same_spin() {
            for y in 0..norb {
                for x in 0..y {
                    // a_x a_y |ket⟩
                    let v = self.solver.annihilate(rows.row(y), norb, once, s1, x)?;
                    let value = self.braket(bra, v.view());
                    hh[(x, y)] = value;
                    hh[(y, x)] = -value;
                }
            }
        } else {
            for x in 0..norb {
                for y in 0..norb {
                    // a_{xα} a_{yβ} = -a_{yβ} a_{xα}
                    let v = self.solver.annihilate(rows.row(x), norb, once, s2, y)?;
                    hh[(x, y)] = -self.braket(bra, v.view());
                }
            }
        }
        self.store.insert_hh(channel, bra, ket, hh);
        Ok(())
    }
}

/// Builds the intermediates of one fragment.
///
/// # Arguments
///
/// * `frag` - The index of the fragment.
/// * `norb` - The number of orbitals in the fragment.
/// * `solver` - The solver of the fragment.
/// * `ci` - The amplitude vectors of the fragment, one per state.
/// * `hopping` - The hopping index of all states.
///
/// # Returns
///
/// The populated store.
pub fn build_fragment_intermediates<T, S>(
    frag: usize,
    norb: usize,
    solver: &S,
    ci: &[Array1<T>],
    hopping: &HoppingIndex,
) -> Result<FragmentIntermediates<T>, anyhow::Error>
where
    T: TdmScalar,
    S: FragmentSolver<T>,
{
    FragmentIntermediatesBuilder::new(frag, norb, solver, ci, hopping)?.build()
}
