//! One crunch rule per excitation topology.
//!
//! Every rule computes the Mulliken block `[p, q, r, s]` of the fragments it involves as an outer
//! product of local factors taken in operator-string order, multiplies in the overlaps of the
//! spectator fragments and the fermionic phase, and hands the block to
//! [`TdmAssembler::place_d2`], which fills in the partners related by electron and annihilator
//! exchange.

use anyhow::{self, format_err};
use ndarray::{s, ArrayViewMut3, ArrayViewMut5, Axis, Ix2};
use ndarray_einsum_beta::einsum;

use super::{into_block4, scaled, TdmAssembler};
use crate::auxiliary::scalar::TdmScalar;
use crate::auxiliary::spin::{PairChannel, Spin};

impl<'a, T: TdmScalar> TdmAssembler<'a, T> {
    /// Identical electron counts in every fragment: local densities, and products of pairs of
    /// local one-body densities.
    pub(super) fn crunch_null(
        &self,
        bra: usize,
        ket: usize,
        d1: &mut ArrayViewMut3<T>,
        d2: &mut ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let dm1s = self
            .stores
            .iter()
            .map(|store| store.get_dm1(bra, ket))
            .collect::<Result<Vec<_>, _>>()?;
        for i in 0..self.nfrags() {
            let fac = self.spectator_factor(bra, ket, &[i])?;
            for spin in Spin::ALL {
                let block = scaled(
                    dm1s[i].index_axis(Axis(0), spin.index()).to_owned(),
                    fac,
                    false,
                );
                self.place_d1(d1, spin, (i, i), &block);
            }
            let dm2 = scaled(self.stores[i].get_dm2(bra, ket)?, fac, false);
            d2.slice_mut(s![
                ..,
                self.range(i),
                self.range(i),
                self.range(i),
                self.range(i)
            ])
            .assign(&dm2);

            for j in (i + 1)..self.nfrags() {
                let fac = self.spectator_factor(bra, ket, &[i, j])?;
                let negative = self.phase2(ket, [i, i, j, j]);
                for s1 in Spin::ALL {
                    for s2 in Spin::ALL {
                        let block = into_block4(einsum(
                            "pq,rs->pqrs",
                            &[
                                &dm1s[i].index_axis(Axis(0), s1.index()),
                                &dm1s[j].index_axis(Axis(0), s2.index()),
                            ],
                        ))?;
                        self.place_d2(d2, (s1, s2), [i, i, j, j], scaled(block, fac, negative));
                    }
                }
            }
        }
        Ok(())
    }

    /// One spin-`σ` electron moving from `source` to `dest`.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn crunch_one_electron(
        &self,
        bra: usize,
        ket: usize,
        spin: Spin,
        dest: usize,
        source: usize,
        d1: &mut ArrayViewMut3<T>,
        d2: &mut ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let (i, j) = (dest, source);
        let p_i = self.stores[i].get_p(spin, bra, ket)?;
        let h_j = self.stores[j].get_h(spin, bra, ket)?;
        let fac = self.spectator_factor(bra, ket, &[i, j])?;

        let block1 = einsum("p,q->pq", &[&p_i, &h_j])
            .map_err(|err| format_err!(err))?
            .into_dimensionality::<Ix2>()?;
        self.place_d1(d1, spin, (i, j), &scaled(block1, fac, self.phase(ket, &[i, j])));

        let pph_i = self.stores[i].get_pph(spin, bra, ket)?;
        let phh_j = self.stores[j].get_phh(spin, bra, ket)?;
        let dm1s = (0..self.nfrags())
            .filter(|k| *k != i && *k != j)
            .map(|k| Ok((k, self.stores[k].get_dm1(bra, ket)?)))
            .collect::<Result<Vec<_>, anyhow::Error>>()?;
        for tau in Spin::ALL {
            // Both creators on the destination.
            let block = into_block4(einsum(
                "prs,q->pqrs",
                &[&pph_i.index_axis(Axis(0), tau.index()), &h_j.view()],
            ))?;
            let negative = self.phase2(ket, [i, j, i, i]);
            self.place_d2(d2, (spin, tau), [i, j, i, i], scaled(block, fac, negative));

            // Both annihilators on the source.
            let block = into_block4(einsum(
                "p,rsq->pqrs",
                &[&p_i.view(), &phh_j.index_axis(Axis(0), tau.index())],
            ))?;
            let negative = self.phase2(ket, [i, j, j, j]);
            self.place_d2(d2, (spin, tau), [i, j, j, j], scaled(block, fac, negative));

            for (k, dm1_k) in dm1s.iter() {
                let fac_k = self.spectator_factor(bra, ket, &[i, j, *k])?;
                let block = into_block4(einsum(
                    "p,q,rs->pqrs",
                    &[&p_i.view(), &h_j.view(), &dm1_k.index_axis(Axis(0), tau.index())],
                ))?;
                let negative = self.phase2(ket, [i, j, *k, *k]);
                self.place_d2(d2, (spin, tau), [i, j, *k, *k], scaled(block, fac_k, negative));
            }
        }
        Ok(())
    }

    /// An α electron moving to `alpha_dest` while a β electron moves to `beta_dest`.
    pub(super) fn crunch_spin_hop(
        &self,
        bra: usize,
        ket: usize,
        alpha_dest: usize,
        beta_dest: usize,
        d2: &mut ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let (i, j) = (alpha_dest, beta_dest);
        let sp_i = self.stores[i].get_sp(bra, ket)?;
        let sm_j = self.stores[j].get_sm(bra, ket)?;
        let fac = self.spectator_factor(bra, ket, &[i, j])?;
        let block = into_block4(einsum("sp,rq->pqrs", &[&sp_i, &sm_j]))?;
        let negative = self.phase2(ket, [i, j, j, i]);
        self.place_d2(
            d2,
            (Spin::Alpha, Spin::Beta),
            [i, j, j, i],
            scaled(block, fac, negative),
        );
        Ok(())
    }

    /// Two electrons moving together from `source` to `dest`.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn crunch_pair_hop(
        &self,
        bra: usize,
        ket: usize,
        channel: PairChannel,
        dest: usize,
        source: usize,
        d2: &mut ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let pp = self.stores[dest].get_pp(channel, bra, ket)?;
        let hh = self.stores[source].get_hh(channel, bra, ket)?;
        self.check_antisymmetry(dest, bra, ket, channel, &pp)?;
        self.check_antisymmetry(source, bra, ket, channel, &hh)?;
        let fac = self.spectator_factor(bra, ket, &[dest, source])?;
        let block = if channel.is_same_spin() {
            into_block4(einsum("pr,sq->pqrs", &[&pp, &hh]))?
        } else {
            into_block4(einsum("rp,qs->pqrs", &[&pp, &hh]))?
        };
        let frags = [dest, source, dest, source];
        let negative = self.phase2(ket, frags);
        self.place_d2(d2, channel.spins(), frags, scaled(block, fac, negative));
        Ok(())
    }

    /// A pair leaving `source` and separating into the two fragments of `dests`.
    pub(super) fn crunch_pair_split(
        &self,
        bra: usize,
        ket: usize,
        channel: PairChannel,
        source: usize,
        dests: [usize; 2],
        d2: &mut ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let (s1, s2) = channel.spins();
        let [c1, c2] = dests;
        let p1 = self.stores[c1].get_p(s1, bra, ket)?;
        let p2 = self.stores[c2].get_p(s2, bra, ket)?;
        let hh = self.stores[source].get_hh(channel, bra, ket)?;
        self.check_antisymmetry(source, bra, ket, channel, &hh)?;
        let fac = self.spectator_factor(bra, ket, &[source, c1, c2])?;
        let block = if channel.is_same_spin() {
            into_block4(einsum("p,r,sq->pqrs", &[&p1.view(), &p2.view(), &hh.view()]))?
        } else {
            into_block4(einsum("p,r,qs->pqrs", &[&p1.view(), &p2.view(), &hh.view()]))?
                .mapv_into(|x| -x)
        };
        let frags = [c1, source, c2, source];
        let negative = self.phase2(ket, frags);
        self.place_d2(d2, (s1, s2), frags, scaled(block, fac, negative));
        Ok(())
    }

    /// Electrons leaving the two fragments of `sources` and coalescing into a pair on `dest`.
    pub(super) fn crunch_pair_coalesce(
        &self,
        bra: usize,
        ket: usize,
        channel: PairChannel,
        dest: usize,
        sources: [usize; 2],
        d2: &mut ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let (s1, s2) = channel.spins();
        let [h1, h2] = sources;
        let pp = self.stores[dest].get_pp(channel, bra, ket)?;
        let hq = self.stores[h1].get_h(s1, bra, ket)?;
        let hs = self.stores[h2].get_h(s2, bra, ket)?;
        self.check_antisymmetry(dest, bra, ket, channel, &pp)?;
        let fac = self.spectator_factor(bra, ket, &[dest, h1, h2])?;
        let block = if channel.is_same_spin() {
            into_block4(einsum("pr,q,s->pqrs", &[&pp.view(), &hq.view(), &hs.view()]))?
        } else {
            into_block4(einsum("rp,q,s->pqrs", &[&pp.view(), &hq.view(), &hs.view()]))?
                .mapv_into(|x| -x)
        };
        let frags = [dest, h1, dest, h2];
        let negative = self.phase2(ket, frags);
        self.place_d2(d2, (s1, s2), frags, scaled(block, fac, negative));
        Ok(())
    }

    /// A fragment flipping its spin while exchanging one electron with each of two partners.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn crunch_spin_coupled_hop(
        &self,
        bra: usize,
        ket: usize,
        flip: usize,
        gains_alpha: bool,
        alpha_partner: usize,
        beta_partner: usize,
        d2: &mut ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let fac = self.spectator_factor(bra, ket, &[flip, alpha_partner, beta_partner])?;
        let (frags, block) = if gains_alpha {
            // α: alpha_partner → flip; β: flip → beta_partner.
            let sp = self.stores[flip].get_sp(bra, ket)?;
            let h_alpha = self.stores[alpha_partner].get_h(Spin::Alpha, bra, ket)?;
            let p_beta = self.stores[beta_partner].get_p(Spin::Beta, bra, ket)?;
            (
                [flip, alpha_partner, beta_partner, flip],
                into_block4(einsum(
                    "sp,q,r->pqrs",
                    &[&sp.view(), &h_alpha.view(), &p_beta.view()],
                ))?,
            )
        } else {
            // α: flip → alpha_partner; β: beta_partner → flip.
            let sm = self.stores[flip].get_sm(bra, ket)?;
            let p_alpha = self.stores[alpha_partner].get_p(Spin::Alpha, bra, ket)?;
            let h_beta = self.stores[beta_partner].get_h(Spin::Beta, bra, ket)?;
            (
                [alpha_partner, flip, flip, beta_partner],
                into_block4(einsum(
                    "p,rq,s->pqrs",
                    &[&p_alpha.view(), &sm.view(), &h_beta.view()],
                ))?,
            )
        };
        let negative = self.phase2(ket, frags);
        self.place_d2(
            d2,
            (Spin::Alpha, Spin::Beta),
            frags,
            scaled(block, fac, negative),
        );
        Ok(())
    }

    /// Two electrons leaving `sources` and arriving at `dests`, all four fragments distinct.
    pub(super) fn crunch_two_electron(
        &self,
        bra: usize,
        ket: usize,
        channel: PairChannel,
        dests: [usize; 2],
        sources: [usize; 2],
        d2: &mut ArrayViewMut5<T>,
    ) -> Result<(), anyhow::Error> {
        let (s1, s2) = channel.spins();
        let [c1, c2] = dests;
        let [h1, h2] = sources;
        let p1 = self.stores[c1].get_p(s1, bra, ket)?;
        let p2 = self.stores[c2].get_p(s2, bra, ket)?;
        let hq = self.stores[h1].get_h(s1, bra, ket)?;
        let hs = self.stores[h2].get_h(s2, bra, ket)?;
        let fac = self.spectator_factor(bra, ket, &[c1, c2, h1, h2])?;
        let block = into_block4(einsum(
            "p,q,r,s->pqrs",
            &[&p1.view(), &hq.view(), &p2.view(), &hs.view()],
        ))?;
        let frags = [c1, h1, c2, h2];
        let negative = self.phase2(ket, frags);
        self.place_d2(d2, (s1, s2), frags, scaled(block, fac, negative));
        Ok(())
    }
}
