//! Spin labels for one- and two-body channels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An enumerated type for the spin of a single fermionic operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Spin {
    /// Variant for spin-up electrons.
    Alpha,

    /// Variant for spin-down electrons.
    Beta,
}

impl Spin {
    /// Both spins in storage order.
    pub const ALL: [Spin; 2] = [Spin::Alpha, Spin::Beta];

    /// Returns the index of this spin along the spin axis of one-body tensors.
    pub fn index(&self) -> usize {
        match self {
            Spin::Alpha => 0,
            Spin::Beta => 1,
        }
    }

    /// Returns the opposite spin.
    pub fn flipped(&self) -> Self {
        match self {
            Spin::Alpha => Spin::Beta,
            Spin::Beta => Spin::Alpha,
        }
    }

    /// Selects the component of an `(α, β)` pair corresponding to this spin.
    pub fn pick<A: Copy>(&self, pair: (A, A)) -> A {
        match self {
            Spin::Alpha => pair.0,
            Spin::Beta => pair.1,
        }
    }
}

impl fmt::Display for Spin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spin::Alpha => write!(f, "α"),
            Spin::Beta => write!(f, "β"),
        }
    }
}

/// Returns the index along the spin-pair axis of two-body tensors for the channel `(σ₁, σ₂)`.
///
/// The channel order is `(αα, αβ, βα, ββ)`.
pub fn spin_pair_index(s1: Spin, s2: Spin) -> usize {
    2 * s1.index() + s2.index()
}

/// An enumerated type for the spin channels of two-operator (pair) amplitudes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairChannel {
    /// Variant for two spin-up operators.
    AlphaAlpha,

    /// Variant for one spin-up and one spin-down operator, in that order.
    AlphaBeta,

    /// Variant for two spin-down operators.
    BetaBeta,
}

impl PairChannel {
    /// Constructs the pair channel from the number of spin-down operators involved.
    pub fn from_beta_count(nbeta: usize) -> Option<Self> {
        match nbeta {
            0 => Some(PairChannel::AlphaAlpha),
            1 => Some(PairChannel::AlphaBeta),
            2 => Some(PairChannel::BetaBeta),
            _ => None,
        }
    }

    /// Constructs the same-spin pair channel of the given spin.
    pub fn same_spin(spin: Spin) -> Self {
        match spin {
            Spin::Alpha => PairChannel::AlphaAlpha,
            Spin::Beta => PairChannel::BetaBeta,
        }
    }

    /// Returns the spins of the first and second operators of the pair.
    pub fn spins(&self) -> (Spin, Spin) {
        match self {
            PairChannel::AlphaAlpha => (Spin::Alpha, Spin::Alpha),
            PairChannel::AlphaBeta => (Spin::Alpha, Spin::Beta),
            PairChannel::BetaBeta => (Spin::Beta, Spin::Beta),
        }
    }

    /// Returns `true` if both operators carry the same spin.
    pub fn is_same_spin(&self) -> bool {
        !matches!(self, PairChannel::AlphaBeta)
    }
}

impl fmt::Display for PairChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (s1, s2) = self.spins();
        write!(f, "{s1}{s2}")
    }
}
