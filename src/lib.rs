//! # lassi-tdm: transition density matrices between multi-fragment product states
//!
//! `lassi-tdm` computes one- and two-particle transition density matrices between basis states
//! whose wavefunctions are products of fragment-local wavefunctions, as used in localised
//! active space state interaction (LASSI). For `R` basis states over `n` orbitals it produces
//!
//! - `tdm1[b, k, σ, p, q] = ⟨b|a†_{pσ} a_{qσ}|k⟩`, of shape `(R, R, 2, n, n)`, and
//! - `tdm2[b, k, στ, p, q, r, s] = ⟨b|a†_{pσ} a†_{rτ} a_{sτ} a_{qσ}|k⟩`, of shape
//!   `(R, R, 4, n, n, n, n)` with the spin-pair axis ordered `(αα, αβ, βα, ββ)`.
//!
//! The calculation proceeds in three stages:
//! - the electron hops between every pair of states are classified per fragment
//!   ([`hopping`]);
//! - each fragment caches the local operator-string amplitudes that the pairs require
//!   ([`intermediates`]), using a [`solver::FragmentSolver`] for all fragment-local work;
//! - the cached amplitudes are assembled into the full tensors with fermionic phases and
//!   Hermitian completion ([`assembly`]).
//!
//! The [`drivers::tdm::LassiTdmDriver`] ties the stages together.
//!
//! ## Conventions
//!
//! A fragment determinant places all α creation operators, in ascending orbital order, to the
//! left of all β creation operators. A basis state is the product `A_0 A_1 ⋯ A_{F-1}|vac⟩` of
//! the creation-operator polynomials of its fragments, in fragment order. Orbitals of all
//! fragments are numbered contiguously in fragment order.
//!
//! ## Examples and usage
//!
//! Usage of most items is illustrated in their test functions. A minimal calculation with the
//! reference determinant solver reads
//!
//! ```rust
//! use lassi_tdm::drivers::tdm::{LassiFragment, LassiTdmDriver, LassiTdmParams};
//! use lassi_tdm::drivers::LassiDriver;
//! use lassi_tdm::solver::determinant::DeterminantSolver;
//! use ndarray::array;
//!
//! // One electron shared between two single-orbital fragments.
//! let solvers = [
//!     DeterminantSolver::from_sectors(1, &[(1, 0), (0, 0)]),
//!     DeterminantSolver::from_sectors(1, &[(0, 0), (1, 0)]),
//! ];
//! let ci = [vec![array![1.0], array![1.0]], vec![array![1.0], array![1.0]]];
//! let params = LassiTdmParams::default();
//! let mut driver = LassiTdmDriver::builder()
//!     .parameters(&params)
//!     .fragments(vec![
//!         LassiFragment::new(1, 1, &solvers[0], &ci[0]),
//!         LassiFragment::new(1, 1, &solvers[1], &ci[1]),
//!     ])
//!     .build()
//!     .unwrap();
//! driver.run().unwrap();
//! let tdm1 = driver.result().unwrap().tdm1();
//! assert_eq!(tdm1[[0, 1, 0, 0, 1]], 1.0);
//! ```
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod assembly;
pub mod auxiliary;
pub mod drivers;
pub mod error;
pub mod fock;
pub mod hopping;
pub mod intermediates;
pub mod io;
pub mod solver;
