//! Interface to fragment-local many-body solvers.
//!
//! The engine never inspects fragment amplitude vectors directly beyond inner products. Every
//! other fragment-local operation (applying annihilation operators, evaluating local transition
//! density matrices, resolving the electron-count sector of a root) is delegated to an
//! implementation of [`FragmentSolver`].

use anyhow;
use ndarray::{Array1, Array3, Array5, ArrayView1};

use crate::auxiliary::scalar::TdmScalar;
use crate::auxiliary::spin::Spin;

pub mod determinant;

#[cfg(test)]
#[path = "solver_tests.rs"]
mod solver_tests;

/// An electron-count sector given as `(nα, nβ)`.
pub type Sector = (usize, usize);

/// Returns the sector obtained by removing one electron of the given spin, if any.
pub fn sector_without(nelec: Sector, spin: Spin) -> Option<Sector> {
    match spin {
        Spin::Alpha => nelec.0.checked_sub(1).map(|na| (na, nelec.1)),
        Spin::Beta => nelec.1.checked_sub(1).map(|nb| (nelec.0, nb)),
    }
}

/// Trait for fragment-local many-body solvers whose amplitude vectors can be contracted by the
/// transition density matrix engine.
///
/// Local one-body densities are laid out as `dm1[σ, p, q] = ⟨bra| a†_{pσ} a_{qσ} |ket⟩` and
/// local two-body densities as `dm2[στ, p, q, r, s] = ⟨bra| a†_{pσ} a†_{rτ} a_{sτ} a_{qσ} |ket⟩`
/// with the spin-pair axis ordered `(αα, αβ, βα, ββ)`.
pub trait FragmentSolver<T: TdmScalar>: Sync {
    /// The type of the index table used to speed up transition density evaluations.
    type IndexTable: Send + Sync;

    /// Returns the electron-count sector of a root given the nominal electron count of the
    /// fragment.
    fn root_nelec(&self, root: usize, nelec: usize) -> Result<Sector, anyhow::Error>;

    /// Returns the length of amplitude vectors in a sector.
    fn sector_dim(&self, norb: usize, nelec: Sector) -> Result<usize, anyhow::Error>;

    /// Generates the index table of a sector.
    fn index_table(&self, norb: usize, nelec: Sector)
        -> Result<Self::IndexTable, anyhow::Error>;

    /// Computes the spin-resolved one- and two-body transition density matrices between two
    /// amplitude vectors of the same sector.
    ///
    /// # Arguments
    ///
    /// * `bra` - The bra amplitude vector.
    /// * `ket` - The ket amplitude vector.
    /// * `norb` - The number of orbitals in the fragment.
    /// * `nelec` - The common sector of `bra` and `ket`.
    /// * `table` - The index table of the sector.
    ///
    /// # Returns
    ///
    /// The one-body density of shape `(2, norb, norb)` and the two-body density of shape
    /// `(4, norb, norb, norb, norb)`.
    fn trans_rdm12s(
        &self,
        bra: ArrayView1<T>,
        ket: ArrayView1<T>,
        norb: usize,
        nelec: Sector,
        table: &Self::IndexTable,
    ) -> Result<(Array3<T>, Array5<T>), anyhow::Error>;

    /// Computes the spin-resolved one-body transition density matrix between two amplitude
    /// vectors of the same sector.
    fn trans_rdm1s(
        &self,
        bra: ArrayView1<T>,
        ket: ArrayView1<T>,
        norb: usize,
        nelec: Sector,
        table: &Self::IndexTable,
    ) -> Result<Array3<T>, anyhow::Error> {
        self.trans_rdm12s(bra, ket, norb, nelec, table)
            .map(|(dm1, _)| dm1)
    }

    /// Applies a single annihilation operator to an amplitude vector.
    ///
    /// # Arguments
    ///
    /// * `ci` - The amplitude vector in sector `nelec`.
    /// * `norb` - The number of orbitals in the fragment.
    /// * `nelec` - The sector of `ci`.
    /// * `spin` - The spin of the annihilated electron.
    /// * `orb` - The orbital of the annihilated electron.
    ///
    /// # Returns
    ///
    /// The amplitude vector of `a_{orb, spin} |ci⟩` in the sector with one fewer electron of the
    /// given spin.
    fn annihilate(
        &self,
        ci: ArrayView1<T>,
        norb: usize,
        nelec: Sector,
        spin: Spin,
        orb: usize,
    ) -> Result<Array1<T>, anyhow::Error>;
}
