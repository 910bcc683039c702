//! Fragment-local intermediates consumed by the assembly of transition density matrices.
//!
//! Each fragment owns one [`FragmentIntermediates`] store. Every family is written for one
//! orientation of a state pair only, and the opposite orientation is derived on read by a fixed
//! conjugation/transposition rule:
//!
//! | Family | Stored orientation | Derived counterpart |
//! |---|---|---|
//! | `h[σ]`, `⟨b|a_{xσ}|k⟩` | `b` has one fewer `σ` electron | `p[σ](b, k) = conj(h[σ](k, b))` |
//! | `hh[c]`, `⟨b|a_{xσ₁} a_{yσ₂}|k⟩` | `b` has two fewer electrons | `pp(b, k) = conj(hh(k, b))ᵀ` |
//! | `phh[σ]`, `⟨b|a†_{rτ} a_{sτ} a_{qσ}|k⟩` | `b` has one fewer `σ` electron | `pph(b, k)[τ, p, r, s] = conj(phh(k, b)[τ, s, r, p])` |
//! | `sm`, `⟨b|a†_{xβ} a_{yα}|k⟩` | `b` has one fewer α and one more β electron | `sp(b, k)[x, y] = conj(sm(k, b)[x, y])` |
//! | `ovlp`, `dm1`, `dm2` | `b ≥ k` | conjugate transpose |
//!
//! Accessors never compute anything beyond these rules; population is the job of
//! [`builder::FragmentIntermediatesBuilder`].

use std::fmt;

use anyhow::{self, format_err};
use indexmap::IndexMap;
use ndarray::{Array1, Array2, Array3, Array4, Array5};

use crate::auxiliary::scalar::TdmScalar;
use crate::auxiliary::spin::{PairChannel, Spin};

pub mod builder;


// ==================
// Struct definitions
// ==================

/// Key of a state pair in the lower triangle, i.e. with `bra ≥ ket`.
///
/// This is the only key type accepted by the symmetric families of
/// [`FragmentIntermediates`], so upper-triangle entries cannot be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LowerPair {
    bra: usize,
    ket: usize,
}

impl LowerPair {
    /// Returns the lower-triangle key of an ordered pair together with a flag that is `true` if
    /// the two states had to be swapped.
    pub fn from_ordered(bra: usize, ket: usize) -> (Self, bool) {
        if bra >= ket {
            (Self { bra, ket }, false)
        } else {
            (Self { bra: ket, ket: bra }, true)
        }
    }

    /// Returns the key of an ordered pair if it already lies in the lower triangle.
    pub fn new(bra: usize, ket: usize) -> Option<Self> {
        (bra >= ket).then_some(Self { bra, ket })
    }

    /// The bra state.
    pub fn bra(&self) -> usize {
        self.bra
    }

    /// The ket state.
    pub fn ket(&self) -> usize {
        self.ket
    }
}

impl fmt::Display for LowerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.bra, self.ket)
    }
}

/// Structure caching the local building blocks of one fragment for every interacting pair of
/// basis states.
#[derive(Clone, Debug)]
pub struct FragmentIntermediates<T: TdmScalar> {
    frag: usize,

    norb: usize,

    /// Single-hole amplitudes, indexed by spin.
    h: [IndexMap<(usize, usize), Array1<T>>; 2],

    /// Two-hole amplitudes.
    hh: IndexMap<(PairChannel, usize, usize), Array2<T>>,

    /// Particle-hole-hole amplitudes of shape `(2, norb, norb, norb)`, indexed by the spin of
    /// the lone annihilation operator.
    phh: [IndexMap<(usize, usize), Array4<T>>; 2],

    /// Spin-lowering amplitudes.
    sm: IndexMap<(usize, usize), Array2<T>>,

    ovlp: IndexMap<LowerPair, T>,

    dm1: IndexMap<LowerPair, Array3<T>>,

    dm2: IndexMap<LowerPair, Array5<T>>,
}

impl<T: TdmScalar> FragmentIntermediates<T> {
    /// Creates an empty store for a fragment.
    pub fn new(frag: usize, norb: usize) -> Self {
        Self {
            frag,
            norb,
            h: [IndexMap::new(), IndexMap::new()],
            hh: IndexMap::new(),
            phh: [IndexMap::new(), IndexMap::new()],
            sm: IndexMap::new(),
            ovlp: IndexMap::new(),
            dm1: IndexMap::new(),
            dm2: IndexMap::new(),
        }
    }

    /// The index of the fragment.
    pub fn frag(&self) -> usize {
        self.frag
    }

    /// The number of orbitals in the fragment.
    pub fn norb(&self) -> usize {
        self.norb
    }

    /// The total number of cached tensors.
    pub fn len(&self) -> usize {
        self.h.iter().map(IndexMap::len).sum::<usize>()
            + self.hh.len()
            + self.phh.iter().map(IndexMap::len).sum::<usize>()
            + self.sm.len()
            + self.ovlp.len()
            + self.dm1.len()
            + self.dm2.len()
    }

    /// Returns `true` if nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn missing(&self, family: &str, bra: usize, ket: usize) -> anyhow::Error {
        format_err!(
            "No `{family}` intermediate has been cached in fragment {} for bra {bra} and ket {ket}.",
            self.frag
        )
    }

    // -------
    // Writers
    // -------

    pub(crate) fn insert_h(&mut self, spin: Spin, bra: usize, ket: usize, value: Array1<T>) {
        self.h[spin.index()].insert((bra, ket), value);
    }

    pub(crate) fn insert_hh(
        &mut self,
        channel: PairChannel,
        bra: usize,
        ket: usize,
        value: Array2<T>,
    ) {
        self.hh.insert((channel, bra, ket), value);
    }

    pub(crate) fn insert_phh(&mut self, spin: Spin, bra: usize, ket: usize, value: Array4<T>) {
        self.phh[spin.index()].insert((bra, ket), value);
    }

    pub(crate) fn insert_sm(&mut self, bra: usize, ket: usize, value: Array2<T>) {
        self.sm.insert((bra, ket), value);
    }

    pub(crate) fn insert_ovlp(&mut self, pair: LowerPair, value: T) {
        self.ovlp.insert(pair, value);
    }

    pub(crate) fn insert_dm1(&mut self, pair: LowerPair, value: Array3<T>) {
        self.dm1.insert(pair, value);
    }

    pub(crate) fn insert_dm2(&mut self, pair: LowerPair, value: Array5<T>) {
        self.dm2.insert(pair, value);
    }

    // -------
    // Readers
    // -------

    /// Returns `h[σ](bra, ket)[x] = ⟨bra|a_{xσ}|ket⟩`.
    pub fn get_h(&self, spin: Spin, bra: usize, ket: usize) -> Result<Array1<T>, anyhow::Error> {
        self.h[spin.index()]
            .get(&(bra, ket))
            .cloned()
            .ok_or_else(|| self.missing("h", bra, ket))
    }

    /// Returns `p[σ](bra, ket)[x] = ⟨bra|a†_{xσ}|ket⟩`.
    pub fn get_p(&self, spin: Spin, bra: usize, ket: usize) -> Result<Array1<T>, anyhow::Error> {
        self.h[spin.index()]
            .get(&(ket, bra))
            .map(|h| h.mapv(|x| x.conj()))
            .ok_or_else(|| self.missing("p", bra, ket))
    }

    /// Returns `hh(bra, ket)[x, y] = ⟨bra|a_{xσ₁} a_{yσ₂}|ket⟩` for the channel `(σ₁, σ₂)`.
    pub fn get_hh(
        &self,
        channel: PairChannel,
        bra: usize,
        ket: usize,
    ) -> Result<Array2<T>, anyhow::Error> {
        self.hh
            .get(&(channel, bra, ket))
            .cloned()
            .ok_or_else(|| self.missing("hh", bra, ket))
    }

    /// Returns `pp(bra, ket)[u, v] = ⟨bra|a†_{uσ₂} a†_{vσ₁}|ket⟩` for the channel `(σ₁, σ₂)`.
    pub fn get_pp(
        &self,
        channel: PairChannel,
        bra: usize,
        ket: usize,
    ) -> Result<Array2<T>, anyhow::Error> {
        self.hh
            .get(&(channel, ket, bra))
            .map(|hh| hh.t().mapv(|x| x.conj()))
            .ok_or_else(|| self.missing("pp", bra, ket))
    }

    /// Returns `phh[σ](bra, ket)[τ, r, s, q] = ⟨bra|a†_{rτ} a_{sτ} a_{qσ}|ket⟩`.
    pub fn get_phh(
        &self,
        spin: Spin,
        bra: usize,
        ket: usize,
    ) -> Result<Array4<T>, anyhow::Error> {
        self.phh[spin.index()]
            .get(&(bra, ket))
            .cloned()
            .ok_or_else(|| self.missing("phh", bra, ket))
    }

    /// Returns `pph[σ](bra, ket)[τ, p, r, s] = ⟨bra|a†_{pσ} a†_{rτ} a_{sτ}|ket⟩`.
    pub fn get_pph(
        &self,
        spin: Spin,
        bra: usize,
        ket: usize,
    ) -> Result<Array4<T>, anyhow::Error> {
        self.phh[spin.index()]
            .get(&(ket, bra))
            .map(|phh| phh.mapv(|x| x.conj()).permuted_axes([0, 3, 2, 1]))
            .ok_or_else(|| self.missing("pph", bra, ket))
    }

    /// Returns `sm(bra, ket)[x, y] = ⟨bra|a†_{xβ} a_{yα}|ket⟩`.
    pub fn get_sm(&self, bra: usize, ket: usize) -> Result<Array2<T>, anyhow::Error> {
        self.sm
            .get(&(bra, ket))
            .cloned()
            .ok_or_else(|| self.missing("sm", bra, ket))
    }

    /// Returns `sp(bra, ket)[x, y] = ⟨bra|a†_{yα} a_{xβ}|ket⟩`.
    pub fn get_sp(&self, bra: usize, ket: usize) -> Result<Array2<T>, anyhow::Error> {
        self.sm
            .get(&(ket, bra))
            .map(|sm| sm.mapv(|x| x.conj()))
            .ok_or_else(|| self.missing("sp", bra, ket))
    }

    /// Returns the local overlap `⟨bra|ket⟩`.
    pub fn get_ovlp(&self, bra: usize, ket: usize) -> Result<T, anyhow::Error> {
        let (pair, swapped) = LowerPair::from_ordered(bra, ket);
        self.ovlp
            .get(&pair)
            .map(|&s| if swapped { s.conj() } else { s })
            .ok_or_else(|| self.missing("ovlp", bra, ket))
    }

    /// Returns the local one-body transition density matrix `dm1[σ, p, q]`.
    pub fn get_dm1(&self, bra: usize, ket: usize) -> Result<Array3<T>, anyhow::Error> {
        let (pair, swapped) = LowerPair::from_ordered(bra, ket);
        self.dm1
            .get(&pair)
            .map(|dm1| {
                if swapped {
                    dm1.mapv(|x| x.conj()).permuted_axes([0, 2, 1])
                } else {
                    dm1.clone()
                }
            })
            .ok_or_else(|| self.missing("dm1", bra, ket))
    }

    /// Returns the local two-body transition density matrix `dm2[στ, p, q, r, s]`.
    pub fn get_dm2(&self, bra: usize, ket: usize) -> Result<Array5<T>, anyhow::Error> {
        let (pair, swapped) = LowerPair::from_ordered(bra, ket);
        self.dm2
            .get(&pair)
            .map(|dm2| {
                if swapped {
                    dm2.mapv(|x| x.conj()).permuted_axes([0, 2, 1, 4, 3])
                } else {
                    dm2.clone()
                }
            })
            .ok_or_else(|| self.missing("dm2", bra, ket))
    }
}
