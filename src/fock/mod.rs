//! Occupation-number bit strings and the action of fermionic operators on them.
//!
//! A bit string encodes a single determinant in some ordered set of spin-orbitals: bit `i` is
//! set if and only if spin-orbital `i` is occupied. The determinant is the product of creation
//! operators for the occupied spin-orbitals in ascending order acting on the vacuum, so applying
//! an operator on spin-orbital `i` picks up a phase of `(-1)^k`, where `k` is the number of
//! occupied spin-orbitals with indices below `i`.

use anyhow::{self, ensure};
use itertools::Itertools;

use crate::error::TdmError;


/// The maximum number of spin-orbitals representable in one bit string.
pub const MAX_SPIN_ORBITALS: usize = 64;

/// An enumerated type for elementary fermionic operators acting on spin-orbitals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FermionOp {
    /// Variant for the creation operator on a spin-orbital.
    Create(usize),

    /// Variant for the annihilation operator on a spin-orbital.
    Annihilate(usize),
}

impl FermionOp {
    /// Returns the spin-orbital this operator acts on.
    pub fn target(&self) -> usize {
        match self {
            FermionOp::Create(i) | FermionOp::Annihilate(i) => *i,
        }
    }

    /// Applies this operator to a determinant.
    ///
    /// # Arguments
    ///
    /// * `det` - The bit string of the determinant.
    ///
    /// # Returns
    ///
    /// `None` if the operator annihilates the determinant, otherwise the resulting bit string
    /// together with a flag that is `true` if the phase is negative.
    pub fn act(&self, det: u64) -> Option<(u64, bool)> {
        let i = self.target();
        if i >= MAX_SPIN_ORBITALS {
            return None;
        }
        let bit = 1u64 << i;
        let occupied = det & bit != 0;
        match self {
            FermionOp::Create(_) if occupied => None,
            FermionOp::Annihilate(_) if !occupied => None,
            _ => Some((det ^ bit, parity_below(det, i))),
        }
    }
}

/// Returns `true` if an odd number of spin-orbitals below `i` are occupied in `det`.
pub fn parity_below(det: u64, i: usize) -> bool {
    let mask = if i >= MAX_SPIN_ORBITALS {
        u64::MAX
    } else {
        (1u64 << i) - 1
    };
    (det & mask).count_ones() % 2 == 1
}

/// Applies an operator string to a determinant.
///
/// The operators are given in written order, so the rightmost operator acts first.
///
/// # Returns
///
/// `None` if the string annihilates the determinant, otherwise the resulting bit string and a
/// flag that is `true` if the accumulated phase is negative.
pub fn apply_string(ops: &[FermionOp], det: u64) -> Option<(u64, bool)> {
    ops.iter()
        .rev()
        .try_fold((det, false), |(current, negative), op| {
            op.act(current)
                .map(|(next, flip)| (next, negative ^ flip))
        })
}

/// Enumerates all occupation strings with `nelec` electrons in `norb` orbitals.
///
/// The strings are returned in ascending integer order, which is the order used to address
/// amplitude vectors.
///
/// # Errors
///
/// Errors if `norb` exceeds the bit-string capacity or `nelec > norb`.
pub fn occupation_strings(norb: usize, nelec: usize) -> Result<Vec<u64>, anyhow::Error> {
    ensure!(
        norb <= MAX_SPIN_ORBITALS,
        TdmError::MalformedInput(format!(
            "{norb} orbitals cannot be encoded in a {MAX_SPIN_ORBITALS}-bit occupation string."
        ))
    );
    ensure!(
        nelec <= norb,
        TdmError::MalformedInput(format!(
            "{nelec} electrons of one spin cannot occupy {norb} orbitals."
        ))
    );
    let strings = (0..norb)
        .combinations(nelec)
        .map(|occ| occ.iter().fold(0u64, |acc, &i| acc | (1u64 << i)))
        .sorted_unstable()
        .collect::<Vec<_>>();
    Ok(strings)
}
