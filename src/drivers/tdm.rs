//! Driver for transition density matrices between multi-fragment product states.

use std::fmt;
use std::time::Instant;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use ndarray::{s, Array1, Array5, ArrayD, Axis};
use num_traits::ToPrimitive;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assembly::{check_hermiticity, TdmAssembler};
use crate::auxiliary::scalar::{modulus, TdmScalar};
use crate::drivers::LassiDriver;
use crate::error::TdmError;
use crate::hopping::HoppingIndex;
use crate::intermediates::builder::build_fragment_intermediates;
use crate::intermediates::FragmentIntermediates;
use crate::io::format::{
    lassi_output, lassi_warn, log_macsec_begin, log_macsec_end, nice_bool, write_subtitle,
    write_title, LassiOutput,
};
use crate::solver::{FragmentSolver, Sector};

#[cfg(test)]
#[path = "tdm_tests.rs"]
mod tdm_tests;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

const fn default_true() -> bool {
    true
}
const fn default_antisymmetry_threshold() -> f64 {
    1.0e-8
}

/// Structure containing control parameters for transition density matrix calculations.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct LassiTdmParams {
    /// The largest tolerated value of `max|M + Mᵀ|` for same-spin pair amplitudes.
    #[builder(default = "1.0e-8")]
    #[serde(default = "default_antisymmetry_threshold")]
    pub antisymmetry_threshold: f64,

    /// Boolean indicating if fragment intermediates and pair blocks are to be computed on the
    /// rayon thread pool.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// If set, the finished tensors are verified to be Hermitian within this threshold.
    #[builder(default = "None")]
    #[serde(default)]
    pub hermiticity_check_threshold: Option<f64>,
}

impl LassiTdmParams {
    /// Returns a builder to construct a [`LassiTdmParams`] structure.
    pub fn builder() -> LassiTdmParamsBuilder {
        LassiTdmParamsBuilder::default()
    }
}

impl Default for LassiTdmParams {
    fn default() -> Self {
        Self {
            antisymmetry_threshold: default_antisymmetry_threshold(),
            parallel: default_true(),
            hermiticity_check_threshold: None,
        }
    }
}

impl fmt::Display for LassiTdmParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_title(f, "LASSI Transition Density Matrices")?;
        writeln!(f)?;
        writeln!(
            f,
            "Antisymmetry threshold: {:.3e}",
            self.antisymmetry_threshold
        )?;
        writeln!(
            f,
            "Hermiticity check: {}",
            self.hermiticity_check_threshold
                .map(|thresh| format!("{thresh:.3e}"))
                .unwrap_or_else(|| "no".to_string())
        )?;
        writeln!(f, "Parallel evaluation: {}", nice_bool(self.parallel))?;
        writeln!(f)?;
        Ok(())
    }
}

// --------
// Fragment
// --------

/// A fragment taking part in the calculation.
pub struct LassiFragment<'a, T, S> {
    /// The number of orbitals in the fragment.
    norb: usize,

    /// The nominal electron count against which the solver reports root sectors.
    nelec: usize,

    /// The solver of the fragment.
    solver: &'a S,

    /// One amplitude vector per root of the solver.
    ci: &'a [Array1<T>],
}

impl<'a, T, S> LassiFragment<'a, T, S> {
    /// Constructs a fragment.
    pub fn new(norb: usize, nelec: usize, solver: &'a S, ci: &'a [Array1<T>]) -> Self {
        Self {
            norb,
            nelec,
            solver,
            ci,
        }
    }

    /// The number of orbitals.
    pub fn norb(&self) -> usize {
        self.norb
    }

    /// The number of roots.
    pub fn nroots(&self) -> usize {
        self.ci.len()
    }
}

impl<'a, T, S> Clone for LassiFragment<'a, T, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T, S> Copy for LassiFragment<'a, T, S> {}

// ------
// Result
// ------

/// Structure containing the transition density matrices between the active basis states.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct TdmResult<T> {
    /// The roots that were active, in output order.
    active_roots: Vec<usize>,

    /// The aggregate `(nα, nβ)` electron counts of the active states.
    nelec: Vec<Sector>,

    /// `tdm1[b, k, σ, p, q] = ⟨b|a†_{pσ} a_{qσ}|k⟩`.
    tdm1: Array5<T>,

    /// `tdm2[b, k, στ, p, q, r, s] = ⟨b|a†_{pσ} a†_{rτ} a_{sτ} a_{qσ}|k⟩`.
    tdm2: ArrayD<T>,
}

impl<T> TdmResult<T> {
    fn builder() -> TdmResultBuilder<T> {
        TdmResultBuilder::default()
    }

    /// The active roots, in output order.
    pub fn active_roots(&self) -> &[usize] {
        &self.active_roots
    }

    /// The aggregate electron counts of the active states.
    pub fn nelec(&self) -> &[Sector] {
        &self.nelec
    }

    /// The one-body transition density matrices, of shape `(R, R, 2, n, n)`.
    pub fn tdm1(&self) -> &Array5<T> {
        &self.tdm1
    }

    /// The two-body transition density matrices, of shape `(R, R, 4, n, n, n, n)`.
    pub fn tdm2(&self) -> &ArrayD<T> {
        &self.tdm2
    }

    /// Consumes the result and returns `(tdm1, tdm2)`.
    pub fn into_tensors(self) -> (Array5<T>, ArrayD<T>) {
        (self.tdm1, self.tdm2)
    }
}

impl<T: TdmScalar> fmt::Display for TdmResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_subtitle(f, "Diagonal one-body traces")?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>6} {:>6} {:>5} {:>5} {:>14} {:>14}",
            "State", "Root", "Nα", "Nβ", "tr γα", "tr γβ"
        )?;
        for (state, (root, (na, nb))) in self
            .active_roots
            .iter()
            .zip(self.nelec.iter())
            .enumerate()
        {
            let d1 = self.tdm1.slice(s![state, state, .., .., ..]);
            let traces = d1
                .axis_iter(Axis(0))
                .map(|block| {
                    let trace = block.diag().sum().re().to_f64().unwrap_or(f64::NAN);
                    format!("{trace:>14.8}")
                })
                .join(" ");
            writeln!(f, "{state:>6} {root:>6} {na:>5} {nb:>5} {traces}")?;
        }
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Driver
// ------

/// Driver for the computation of one- and two-body transition density matrices between
/// product states of fragment wavefunctions.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct LassiTdmDriver<'a, T, S>
where
    T: TdmScalar,
    S: FragmentSolver<T>,
{
    /// The control parameters.
    parameters: &'a LassiTdmParams,

    /// The fragments, in the order in which their creation strings act on the vacuum.
    fragments: Vec<LassiFragment<'a, T, S>>,

    /// The roots taking part in the calculation. All roots are active if this is `None`.
    #[builder(default = "None")]
    active_roots: Option<Vec<usize>>,

    #[builder(setter(skip), default = "None")]
    result: Option<TdmResult<T>>,
}

impl<'a, T, S> LassiTdmDriverBuilder<'a, T, S>
where
    T: TdmScalar,
    S: FragmentSolver<T> + Clone,
{
    fn validate(&self) -> Result<(), String> {
        let _params = self
            .parameters
            .ok_or("No transition density matrix parameters found.".to_string())?;
        let fragments = self
            .fragments
            .as_ref()
            .ok_or("No fragments found.".to_string())?;
        let nroots = fragments
            .first()
            .map(|frag| frag.nroots())
            .ok_or("At least one fragment is required.".to_string())?;
        if let Some(frag) = fragments.iter().position(|frag| frag.nroots() != nroots) {
            return Err(format!(
                "Fragment {frag} has {} amplitude vectors, but fragment 0 has {nroots}.",
                fragments[frag].nroots()
            ));
        }
        if let Some(Some(active_roots)) = self.active_roots.as_ref() {
            if active_roots.is_empty() {
                return Err("The active root set is empty.".to_string());
            }
            if let Some(root) = active_roots.iter().find(|&&root| root >= nroots) {
                return Err(format!(
                    "Active root {root} is out of range for {nroots} roots."
                ));
            }
            if !active_roots.iter().all_unique() {
                return Err("The active root set contains duplicates.".to_string());
            }
        } else if nroots == 0 {
            return Err("No roots found.".to_string());
        }
        Ok(())
    }
}

impl<'a, T, S> LassiTdmDriver<'a, T, S>
where
    T: TdmScalar,
    S: FragmentSolver<T> + Clone,
{
    /// Returns a builder to construct a [`LassiTdmDriver`] structure.
    pub fn builder() -> LassiTdmDriverBuilder<'a, T, S> {
        LassiTdmDriverBuilder::default()
    }

    fn active_roots(&self) -> Vec<usize> {
        self.active_roots.clone().unwrap_or_else(|| {
            (0..self.fragments.first().map(|frag| frag.nroots()).unwrap_or(0)).collect()
        })
    }

    /// Determines the sector of every active root in every fragment and checks the amplitude
    /// vectors against them.
    ///
    /// # Returns
    ///
    /// `nelec_frs[f][r]`, the `(nα, nβ)` counts of fragment `f` in active state `r`.
    fn validate_states(&self, active_roots: &[usize]) -> Result<Vec<Vec<Sector>>, anyhow::Error> {
        self.fragments
            .iter()
            .enumerate()
            .map(|(f, frag)| {
                active_roots
                    .iter()
                    .map(|&root| -> Result<Sector, anyhow::Error> {
                        let (na, nb) = frag.solver.root_nelec(root, frag.nelec)?;
                        ensure!(
                            na <= frag.norb && nb <= frag.norb,
                            TdmError::MalformedInput(format!(
                                "Root {root} of fragment {f} holds ({na}, {nb}) electrons in {} orbitals.",
                                frag.norb
                            ))
                        );
                        let dim = frag.solver.sector_dim(frag.norb, (na, nb))?;
                        let ci = &frag.ci[root];
                        ensure!(
                            ci.len() == dim,
                            TdmError::MalformedInput(format!(
                                "Root {root} of fragment {f} has {} amplitudes, but its ({na}, {nb}) sector has {dim} determinants.",
                                ci.len()
                            ))
                        );
                        let norm = ci
                            .iter()
                            .map(|&c| modulus(c).powi(2))
                            .sum::<f64>()
                            .sqrt();
                        if (norm - 1.0).abs() > 1.0e-6 {
                            lassi_warn!(
                                "Root {root} of fragment {f} has norm {norm:.6}; diagonal traces will not equal electron counts."
                            );
                        }
                        Ok((na, nb))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    fn build_intermediates(
        &self,
        active_roots: &[usize],
        hopping: &HoppingIndex,
    ) -> Result<Vec<FragmentIntermediates<T>>, anyhow::Error> {
        let active_ci = self
            .fragments
            .iter()
            .map(|frag| {
                active_roots
                    .iter()
                    .map(|&root| frag.ci[root].clone())
                    .collect_vec()
            })
            .collect_vec();
        let build = |f: usize| {
            let frag = &self.fragments[f];
            build_fragment_intermediates(f, frag.norb, frag.solver, &active_ci[f], hopping)
        };
        if self.parameters.parallel {
            (0..self.fragments.len())
                .into_par_iter()
                .map(build)
                .collect()
        } else {
            (0..self.fragments.len()).map(build).collect()
        }
    }

    fn compute_tdms(&mut self) -> Result<(), anyhow::Error> {
        let params = self.parameters;
        params.log_output_display();
        log_macsec_begin("Transition density matrices");
        lassi_output!("");

        let start = Instant::now();
        let active_roots = self.active_roots();
        let nelec_frs = self.validate_states(&active_roots)?;
        let hopping = HoppingIndex::new(&nelec_frs)?;
        let norb = self.fragments.iter().map(|frag| frag.norb).sum::<usize>();
        lassi_output!(
            "{} fragments, {} orbitals, {} active states.",
            self.fragments.len(),
            norb,
            active_roots.len()
        );

        let stores = self.build_intermediates(&active_roots, &hopping)?;
        lassi_output!(
            "Fragment intermediates built ({} entries) after {:.3} s.",
            stores.iter().map(|store| store.len()).sum::<usize>(),
            start.elapsed().as_secs_f64()
        );

        let assembler = TdmAssembler::new(&hopping, &stores, params.antisymmetry_threshold)?;
        let (mut tdm1, mut tdm2) = assembler.allocate();
        assembler.assemble_upper(&mut tdm1, &mut tdm2, params.parallel)?;
        lassi_output!(
            "Upper-triangle pair blocks assembled after {:.3} s.",
            start.elapsed().as_secs_f64()
        );

        assembler.complete(&mut tdm1, &mut tdm2, params.parallel)?;
        lassi_output!(
            "Hermitian completion and diagonal blocks done after {:.3} s.",
            start.elapsed().as_secs_f64()
        );

        if let Some(thresh) = params.hermiticity_check_threshold {
            check_hermiticity(&tdm1, &tdm2, thresh)?;
            lassi_output!("Hermiticity verified to within {thresh:.3e}.");
        }
        lassi_output!("");

        let nelec = (0..active_roots.len())
            .map(|state| hopping.total_nelec(state))
            .collect_vec();
        let result = TdmResult::builder()
            .active_roots(active_roots)
            .nelec(nelec)
            .tdm1(tdm1)
            .tdm2(tdm2)
            .build()
            .map_err(|err| format_err!(err))?;
        result.log_output_display();
        log_macsec_end("Transition density matrices");
        lassi_output!("");

        self.result = Some(result);
        Ok(())
    }
}

impl<'a, T, S> LassiDriver for LassiTdmDriver<'a, T, S>
where
    T: TdmScalar,
    S: FragmentSolver<T> + Clone,
{
    type Params = LassiTdmParams;

    type Outcome = TdmResult<T>;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No transition density matrix results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.compute_tdms()
    }
}
