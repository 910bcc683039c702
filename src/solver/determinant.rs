//! A reference fragment solver working directly on determinant amplitudes.

use anyhow::{self, ensure, format_err};
use ndarray::{Array1, Array3, Array5, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::auxiliary::scalar::{with_phase, TdmScalar};
use crate::auxiliary::spin::{spin_pair_index, Spin};
use crate::error::TdmError;
use crate::fock::{apply_string, occupation_strings, FermionOp, MAX_SPIN_ORBITALS};
use crate::solver::{sector_without, FragmentSolver, Sector};

#[cfg(test)]
#[path = "determinant_tests.rs"]
mod determinant_tests;

// ==================
// Struct definitions
// ==================

/// Sorted α and β occupation strings of one sector.
///
/// The determinant with α-string index `ia` and β-string index `ib` sits at position
/// `ia * n_beta_strings + ib` of an amplitude vector. Within a determinant, α spin-orbitals
/// precede β spin-orbitals: α orbital `p` is spin-orbital `p` and β orbital `p` is spin-orbital
/// `norb + p`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CiStrings {
    norb: usize,
    nelec: Sector,
    alpha: Vec<u64>,
    beta: Vec<u64>,
}

impl CiStrings {
    /// Enumerates the strings of a sector.
    pub fn new(norb: usize, nelec: Sector) -> Result<Self, anyhow::Error> {
        ensure!(
            2 * norb <= MAX_SPIN_ORBITALS,
            TdmError::MalformedInput(format!(
                "{norb} orbitals exceed the capacity of the determinant solver."
            ))
        );
        Ok(Self {
            norb,
            nelec,
            alpha: occupation_strings(norb, nelec.0)?,
            beta: occupation_strings(norb, nelec.1)?,
        })
    }

    /// The number of orbitals.
    pub fn norb(&self) -> usize {
        self.norb
    }

    /// The sector of these strings.
    pub fn nelec(&self) -> Sector {
        self.nelec
    }

    /// The number of determinants in the sector.
    pub fn ndet(&self) -> usize {
        self.alpha.len() * self.beta.len()
    }

    /// Returns the spin-orbital index of an orbital of a given spin.
    pub fn spin_orbital(&self, spin: Spin, orb: usize) -> usize {
        spin.index() * self.norb + orb
    }

    /// Returns the combined bit string of the determinant at a given position.
    fn det(&self, idx: usize) -> u64 {
        let nb = self.beta.len();
        self.alpha[idx / nb] | (self.beta[idx % nb] << self.norb)
    }

    /// Returns the position of a combined bit string, if it belongs to this sector.
    fn address(&self, det: u64) -> Option<usize> {
        let mask = (1u64 << self.norb) - 1;
        let ia = self.alpha.binary_search(&(det & mask)).ok()?;
        let ib = self.beta.binary_search(&(det >> self.norb)).ok()?;
        Some(ia * self.beta.len() + ib)
    }

    /// Applies an operator string to an amplitude vector of this sector, projecting the result
    /// onto the sector `target`.
    fn apply<T: TdmScalar>(
        &self,
        ci: ArrayView1<T>,
        target: &CiStrings,
        ops: &[FermionOp],
    ) -> Array1<T> {
        let mut out = Array1::<T>::zeros(target.ndet());
        ci.iter()
            .enumerate()
            .filter(|(_, c)| !c.is_zero())
            .for_each(|(i, &c)| {
                if let Some((new_det, negative)) = apply_string(ops, self.det(i)) {
                    if let Some(j) = target.address(new_det) {
                        out[j] = out[j] + with_phase(c, negative);
                    }
                }
            });
        out
    }

    /// Evaluates `⟨bra| ops |ket⟩` for two vectors of this sector and a number-conserving
    /// operator string.
    fn matrix_element<T: TdmScalar>(
        &self,
        bra: &ArrayView1<T>,
        ket: &ArrayView1<T>,
        ops: &[FermionOp],
    ) -> T {
        ket.iter()
            .enumerate()
            .filter(|(_, c)| !c.is_zero())
            .fold(T::zero(), |acc, (i, &c)| {
                match apply_string(ops, self.det(i))
                    .and_then(|(new_det, negative)| Some((self.address(new_det)?, negative)))
                {
                    Some((j, negative)) => acc + bra[j].conj() * with_phase(c, negative),
                    None => acc,
                }
            })
    }
}

/// The electron-count sector of one root relative to a fragment's nominal electron count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSector {
    /// The charge of the root: the nominal electron count minus the actual one.
    pub charge: i64,

    /// Twice the spin projection, `nα - nβ`.
    pub twice_ms: i64,
}

impl RootSector {
    /// Constructs a root sector.
    pub fn new(charge: i64, twice_ms: i64) -> Self {
        Self { charge, twice_ms }
    }
}

/// A solver representing fragment wavefunctions directly as vectors of determinant amplitudes.
///
/// Each root is assigned a [`RootSector`]; amplitude vectors follow the layout of
/// [`CiStrings`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminantSolver {
    roots: Vec<RootSector>,
}

impl DeterminantSolver {
    /// Constructs a solver from the sectors of its roots.
    pub fn new(roots: Vec<RootSector>) -> Self {
        Self { roots }
    }

    /// Constructs a solver from explicit `(nα, nβ)` counts of its roots, measured against a
    /// nominal electron count.
    pub fn from_sectors(nelec: usize, sectors: &[Sector]) -> Self {
        let roots = sectors
            .iter()
            .map(|&(na, nb)| {
                RootSector::new(nelec as i64 - (na + nb) as i64, na as i64 - nb as i64)
            })
            .collect();
        Self { roots }
    }

    /// The number of roots.
    pub fn nroots(&self) -> usize {
        self.roots.len()
    }
}

// =====================
// Trait implementations
// =====================

impl<T: TdmScalar> FragmentSolver<T> for DeterminantSolver {
    type IndexTable = CiStrings;

    fn root_nelec(&self, root: usize, nelec: usize) -> Result<Sector, anyhow::Error> {
        let sector = self.roots.get(root).ok_or_else(|| {
            format_err!(TdmError::MalformedInput(format!(
                "Root {root} is out of range for a solver with {} roots.",
                self.roots.len()
            )))
        })?;
        let n = nelec as i64 - sector.charge;
        ensure!(
            n >= sector.twice_ms.abs() && (n + sector.twice_ms) % 2 == 0,
            TdmError::MalformedInput(format!(
                "Root {root} with charge {} and 2Ms = {} is incompatible with {nelec} nominal electrons.",
                sector.charge, sector.twice_ms
            ))
        );
        let na = usize::try_from((n + sector.twice_ms) / 2)?;
        let nb = usize::try_from((n - sector.twice_ms) / 2)?;
        Ok((na, nb))
    }

    fn sector_dim(&self, norb: usize, nelec: Sector) -> Result<usize, anyhow::Error> {
        Ok(CiStrings::new(norb, nelec)?.ndet())
    }

    fn index_table(&self, norb: usize, nelec: Sector) -> Result<CiStrings, anyhow::Error> {
        CiStrings::new(norb, nelec)
    }

    fn trans_rdm12s(
        &self,
        bra: ArrayView1<T>,
        ket: ArrayView1<T>,
        norb: usize,
        nelec: Sector,
        table: &CiStrings,
    ) -> Result<(Array3<T>, Array5<T>), anyhow::Error> {
        let dm1 = self.trans_rdm1s(bra.view(), ket.view(), norb, nelec, table)?;
        let mut dm2 = Array5::<T>::zeros((4, norb, norb, norb, norb));
        for s1 in Spin::ALL {
            for s2 in Spin::ALL {
                let c = spin_pair_index(s1, s2);
                for p in 0..norb {
                    for q in 0..norb {
                        for r in 0..norb {
                            for s in 0..norb {
                                let ops = [
                                    FermionOp::Create(table.spin_orbital(s1, p)),
                                    FermionOp::Create(table.spin_orbital(s2, r)),
                                    FermionOp::Annihilate(table.spin_orbital(s2, s)),
                                    FermionOp::Annihilate(table.spin_orbital(s1, q)),
                                ];
                                dm2[(c, p, q, r, s)] = table.matrix_element(&bra, &ket, &ops);
                            }
                        }
                    }
                }
            }
        }
        Ok((dm1, dm2))
    }

    fn trans_rdm1s(
        &self,
        bra: ArrayView1<T>,
        ket: ArrayView1<T>,
        norb: usize,
        nelec: Sector,
        table: &CiStrings,
    ) -> Result<Array3<T>, anyhow::Error> {
        ensure!(
            table.norb() == norb && table.nelec() == nelec,
            "The index table does not describe {norb} orbitals in sector {nelec:?}."
        );
        ensure!(
            bra.len() == table.ndet() && ket.len() == table.ndet(),
            TdmError::MalformedInput(format!(
                "Amplitude vectors of lengths {} and {} do not match the {} determinants of sector {nelec:?}.",
                bra.len(),
                ket.len(),
                table.ndet()
            ))
        );
        let mut dm1 = Array3::<T>::zeros((2, norb, norb));
        for spin in Spin::ALL {
            for p in 0..norb {
                for q in 0..norb {
                    let ops = [
                        FermionOp::Create(table.spin_orbital(spin, p)),
                        FermionOp::Annihilate(table.spin_orbital(spin, q)),
                    ];
                    dm1[(spin.index(), p, q)] = table.matrix_element(&bra, &ket, &ops);
                }
            }
        }
        Ok(dm1)
    }

    fn annihilate(
        &self,
        ci: ArrayView1<T>,
        norb: usize,
        nelec: Sector,
        spin: Spin,
        orb: usize,
    ) -> Result<Array1<T>, anyhow::Error> {
        ensure!(
            orb < norb,
            TdmError::MalformedInput(format!(
                "Orbital {orb} is out of range for a fragment with {norb} orbitals."
            ))
        );
        let target_nelec = sector_without(nelec, spin).ok_or_else(|| {
            format_err!(TdmError::MalformedInput(format!(
                "No {spin} electron can be removed from sector {nelec:?}."
            )))
        })?;
        let source = CiStrings::new(norb, nelec)?;
        ensure!(
            ci.len() == source.ndet(),
            TdmError::MalformedInput(format!(
                "An amplitude vector of length {} does not match the {} determinants of sector {nelec:?}.",
                ci.len(),
                source.ndet()
            ))
        );
        let target = CiStrings::new(norb, target_nelec)?;
        Ok(source.apply(
            ci,
            &target,
            &[FermionOp::Annihilate(source.spin_orbital(spin, orb))],
        ))
    }
}
