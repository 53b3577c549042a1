use crate::cal_aux::{AddDs, ResultMerger, UnitResult, cal_ds_transpose, ds_exchange, ds_translate};
use crate::error::Result;
use crate::lri::{find, find_rel};
use crate::prelude::*;
use crate::tensor_multiply as tm;
use itertools::Itertools;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Per-contribution weight for [`Lri::cal`].
///
/// Called with the pattern and the four keys `(Aa01, Aa2, Ab01, Ab2)` of one
/// elementary contribution.
pub type Coefficient<'a> =
    Box<dyn Fn(Loop3Label, Atom, &AtomCell, &AtomCell, &AtomCell) -> f64 + Send + Sync + 'a>;

pub fn coefficient<'a>(
    f: impl Fn(Loop3Label, Atom, &AtomCell, &AtomCell, &AtomCell) -> f64 + Send + Sync + 'a,
) -> Coefficient<'a> {
    Box::new(f)
}

#[derive(Debug, Default)]
struct LoopCursor(AtomicUsize);

impl LoopCursor {
    fn claim(&self, len: usize) -> Option<usize> {
        let idx = self.0.fetch_add(1, Ordering::Relaxed);
        (idx < len).then_some(idx)
    }
}

#[derive(Debug, Clone, Copy)]
struct Loop3Unit {
    label: Loop3Label,
    outer: usize,
    inner: usize,
}

struct Loop3Context<'a> {
    lri: &'a Lri,
    ds_a_t: Ds,
    ds_b_t: Ds,
}

impl<'a> Loop3Context<'a> {
    fn new(lri: &'a Lri, labels: &[Loop3Label]) -> Result<Self> {
        let transposed = |label: DsLabel, flag: bool| -> Result<Ds> {
            match (flag, lri.ds(label)) {
                (true, Some(ds)) => cal_ds_transpose(ds),
                _ => Ok(Ds::new()),
            }
        };
        let ds_a_t = transposed(DsLabel::A, labels.iter().any(|l| l.needs_a_transpose()))?;
        let ds_b_t = transposed(DsLabel::B, labels.iter().any(|l| l.needs_b_transpose()))?;
        Ok(Self { lri, ds_a_t, ds_b_t })
    }

    fn parallel(&self) -> &dyn Distribute {
        self.lri.parallel.as_ref()
    }

    fn period(&self) -> &Cell {
        &self.lri.period
    }

    fn extent(&self, label: Loop3Label) -> (usize, usize) {
        let parallel = self.parallel();
        match label {
            Loop3Label::A0b0A1b1 => (parallel.list_aa2().len(), parallel.list_ab01().len()),
            Loop3Label::A0b0A1b2 => (parallel.list_ab01().len(), parallel.list_aa01().len()),
            Loop3Label::A0b0A2b1 => (parallel.list_aa01().len(), parallel.list_ab01().len()),
            Loop3Label::A0b0A2b2 => (parallel.list_aa01().len(), parallel.list_ab2().len()),
        }
    }

    fn schedule(&self, labels: &[Loop3Label]) -> Vec<Loop3Unit> {
        labels
            .iter()
            .flat_map(|&label| {
                let (nouter, ninner) = self.extent(label);
                (0..nouter).cartesian_product(0..ninner).map(move |(outer, inner)| Loop3Unit { label, outer, inner })
            })
            .collect()
    }
}

/* #region cal_loop3 patterns */

impl Loop3Context<'_> {
    fn loop3(&self, unit: Loop3Unit) -> Result<Ds> {
        let parallel = self.parallel();
        let Loop3Unit { label, outer, inner } = unit;
        match label {
            Loop3Label::A0b0A1b1 => self.loop3_a0b0_a1b1(&parallel.list_aa2()[outer], &parallel.list_ab01()[inner]),
            Loop3Label::A0b0A1b2 => self.loop3_a0b0_a1b2(&parallel.list_ab01()[outer], parallel.list_aa01()[inner]),
            Loop3Label::A0b0A2b1 => self.loop3_a0b0_a2b1(parallel.list_aa01()[outer], &parallel.list_ab01()[inner]),
            Loop3Label::A0b0A2b2 => self.loop3_a0b0_a2b2(parallel.list_aa01()[outer], &parallel.list_ab2()[inner]),
        }
    }

    fn loop3_a0b0_a1b1(&self, aa2: &AtomCell, ab01: &AtomCell) -> Result<Ds> {
        let (lri, parallel) = (self.lri, self.parallel());
        let mut d_mul = Block::default();
        for &aa01 in parallel.list_aa01() {
            let Some(d_a) = lri.get_ds(DsLabel::A, aa01, aa2) else { continue };
            let Some(d_a0b0) = lri.get_ds(DsLabel::A0b0, aa01, ab01) else { continue };
            let Some(d_a1b1) = lri.get_ds(DsLabel::A1b1, aa01, ab01) else { continue };
            // a1 a2 b0
            let d_tmp1 = tm::x1x2y1_x0y0(d_a, d_a0b0)?;
            // a2 b0 b1
            let d_tmp2 = tm::x1x2y1_x0y0(&d_tmp1, d_a1b1)?;
            d_mul.add_ds(d_tmp2, 1.0)?;
        }
        if d_mul.is_empty() {
            return Ok(Ds::new());
        }
        let mut ds_fixed = DsMap::new();
        for ab2 in parallel.list_ab2() {
            let Some(d_b) = lri.get_ds_rel(DsLabel::B, ab01, ab2) else { continue };
            // a2 b2
            let d_tmp3 = tm::x0y2_x1y0_x2y1(&d_mul, d_b)?;
            ds_fixed.entry(*ab2).or_default().add_ds(d_tmp3, 1.0)?;
        }
        let ds_fixed = ds_translate(ds_fixed, &aa2.1, self.period())?;
        Ok(Ds::from([(aa2.0, ds_fixed)]))
    }

    fn loop3_a0b0_a1b2(&self, ab01: &AtomCell, aa01: Atom) -> Result<Ds> {
        let (lri, parallel) = (self.lri, self.parallel());
        let Some(d_a0b0) = lri.get_ds(DsLabel::A0b0, aa01, ab01) else { return Ok(Ds::new()) };
        let mut d_mul = Block::default();
        for ab2 in parallel.list_ab2() {
            let Some(d_b) = lri.get_ds_rel(DsLabel::B, ab01, ab2) else { continue };
            let Some(d_a1b2) = lri.get_ds(DsLabel::A1b2, aa01, ab2) else { continue };
            // b0 b1 a1
            d_mul.add_ds(tm::x0x1y0_x2y1(d_b, d_a1b2)?, 1.0)?;
        }
        if d_mul.is_empty() {
            return Ok(Ds::new());
        }
        // b1 a1 a0
        let d_tmp2 = tm::x1x2y0_x0y1(&d_mul, d_a0b0)?;
        let mut ds_fixed = DsMap::new();
        for aa2 in parallel.list_aa2() {
            let Some(d_a_t) = find(&self.ds_a_t, aa01, aa2) else { continue };
            // a2 b1
            let d_tmp3 = tm::x2y0_x0y1_x1y2(d_a_t, &d_tmp2)?;
            ds_fixed.entry(*aa2).or_default().add_ds(d_tmp3, 1.0)?;
        }
        ds_exchange(ds_fixed, ab01, self.period())
    }

    fn loop3_a0b0_a2b1(&self, aa01: Atom, ab01: &AtomCell) -> Result<Ds> {
        let (lri, parallel) = (self.lri, self.parallel());
        let Some(d_a0b0) = lri.get_ds(DsLabel::A0b0, aa01, ab01) else { return Ok(Ds::new()) };
        let mut d_mul = Block::default();
        for aa2 in parallel.list_aa2() {
            let Some(d_a) = lri.get_ds(DsLabel::A, aa01, aa2) else { continue };
            let Some(d_a2b1) = lri.get_ds_rel(DsLabel::A2b1, aa2, ab01) else { continue };
            // a0 a1 b1
            d_mul.add_ds(tm::x0x1y1_x2y0(d_a, d_a2b1)?, 1.0)?;
        }
        if d_mul.is_empty() {
            return Ok(Ds::new());
        }
        // a1 b1 b0
        let d_tmp2 = tm::x1x2y1_x0y0(&d_mul, d_a0b0)?;
        let mut ds_fixed = DsMap::new();
        for ab2 in parallel.list_ab2() {
            let Some(d_b_t) = find_rel(&self.ds_b_t, ab01, ab2, self.period()) else { continue };
            // a1 b2
            let d_tmp3 = tm::x0y2_x1y0_x2y1(&d_tmp2, d_b_t)?;
            ds_fixed.entry(*ab2).or_default().add_ds(d_tmp3, 1.0)?;
        }
        Ok(Ds::from([(aa01, ds_fixed)]))
    }

    fn loop3_a0b0_a2b2(&self, aa01: Atom, ab2: &AtomCell) -> Result<Ds> {
        let (lri, parallel) = (self.lri, self.parallel());
        let mut d_mul = Block::default();
        for aa2 in parallel.list_aa2() {
            let Some(d_a_t) = find(&self.ds_a_t, aa01, aa2) else { continue };
            let Some(d_a2b2) = lri.get_ds_rel(DsLabel::A2b2, aa2, ab2) else { continue };
            // b2 a1 a0
            d_mul.add_ds(tm::x1y0y1_x0y2(d_a2b2, d_a_t)?, 1.0)?;
        }
        if d_mul.is_empty() {
            return Ok(Ds::new());
        }
        let mut ds_fixed = DsMap::new();
        for ab01 in parallel.list_ab01() {
            let Some(d_b_t) = find_rel(&self.ds_b_t, ab01, ab2, self.period()) else { continue };
            let Some(d_a0b0) = lri.get_ds(DsLabel::A0b0, aa01, ab01) else { continue };
            // b0 b2 a1
            let d_tmp2 = tm::x1y0y1_x0y2(d_a0b0, &d_mul)?;
            // a1 b1
            let d_tmp3 = tm::x2y0_x0y1_x1y2(&d_tmp2, d_b_t)?;
            ds_fixed.entry(*ab01).or_default().add_ds(d_tmp3, 1.0)?;
        }
        Ok(Ds::from([(aa01, ds_fixed)]))
    }
}

/* #endregion */

/* #region cal patterns */

impl Loop3Context<'_> {
    fn add_weighted(
        partial: &mut [Ds],
        coefficients: &[Coefficient],
        keys: (Loop3Label, Atom, &AtomCell, &AtomCell, &AtomCell),
        (key_a, key_b): (Atom, AtomCell),
        block: &Block,
    ) -> Result<()> {
        let (label, aa01, aa2, ab01, ab2) = keys;
        for (ds, coefficient) in partial.iter_mut().zip(coefficients) {
            let fac = coefficient(label, aa01, aa2, ab01, ab2);
            if fac == 0.0 {
                continue;
            }
            ds.entry(key_a).or_default().entry(key_b).or_default().add_ds(block.clone(), fac)?;
        }
        Ok(())
    }

    fn cal(&self, label: Loop3Label, aa01: Atom, coefficients: &[Coefficient], partial: &mut [Ds]) -> Result<()> {
        let (lri, parallel, period) = (self.lri, self.parallel(), self.period());
        match label {
            Loop3Label::A0b0A1b1 => {
                for aa2 in parallel.list_aa2() {
                    let Some(d_a) = lri.get_ds(DsLabel::A, aa01, aa2) else { continue };
                    for ab01 in parallel.list_ab01() {
                        let Some(d_a0b0) = lri.get_ds(DsLabel::A0b0, aa01, ab01) else { continue };
                        let Some(d_a1b1) = lri.get_ds(DsLabel::A1b1, aa01, ab01) else { continue };
                        let d_tmp1 = tm::x1x2y1_x0y0(d_a, d_a0b0)?;
                        let d_tmp2 = tm::x1x2y1_x0y0(&d_tmp1, d_a1b1)?;
                        for ab2 in parallel.list_ab2() {
                            let Some(d_b) = lri.get_ds_rel(DsLabel::B, ab01, ab2) else { continue };
                            let d_tmp3 = tm::x0y2_x1y0_x2y1(&d_tmp2, d_b)?;
                            let key = (aa2.0, (ab2.0, cell_sub(&ab2.1, &aa2.1, period)));
                            Self::add_weighted(partial, coefficients, (label, aa01, aa2, ab01, ab2), key, &d_tmp3)?;
                        }
                    }
                }
            },
            Loop3Label::A0b0A1b2 => {
                for ab01 in parallel.list_ab01() {
                    let Some(d_a0b0) = lri.get_ds(DsLabel::A0b0, aa01, ab01) else { continue };
                    for ab2 in parallel.list_ab2() {
                        let Some(d_b) = lri.get_ds_rel(DsLabel::B, ab01, ab2) else { continue };
                        let Some(d_a1b2) = lri.get_ds(DsLabel::A1b2, aa01, ab2) else { continue };
                        let d_tmp1 = tm::x0x1y0_x2y1(d_b, d_a1b2)?;
                        let d_tmp2 = tm::x1x2y0_x0y1(&d_tmp1, d_a0b0)?;
                        for aa2 in parallel.list_aa2() {
                            let Some(d_a_t) = find(&self.ds_a_t, aa01, aa2) else { continue };
                            let d_tmp3 = tm::x2y0_x0y1_x1y2(d_a_t, &d_tmp2)?;
                            let key = (aa2.0, (ab01.0, cell_sub(&ab01.1, &aa2.1, period)));
                            Self::add_weighted(partial, coefficients, (label, aa01, aa2, ab01, ab2), key, &d_tmp3)?;
                        }
                    }
                }
            },
            Loop3Label::A0b0A2b1 => {
                for ab01 in parallel.list_ab01() {
                    let Some(d_a0b0) = lri.get_ds(DsLabel::A0b0, aa01, ab01) else { continue };
                    for aa2 in parallel.list_aa2() {
                        let Some(d_a) = lri.get_ds(DsLabel::A, aa01, aa2) else { continue };
                        let Some(d_a2b1) = lri.get_ds_rel(DsLabel::A2b1, aa2, ab01) else { continue };
                        let d_tmp1 = tm::x0x1y1_x2y0(d_a, d_a2b1)?;
                        let d_tmp2 = tm::x1x2y1_x0y0(&d_tmp1, d_a0b0)?;
                        for ab2 in parallel.list_ab2() {
                            let Some(d_b_t) = find_rel(&self.ds_b_t, ab01, ab2, period) else { continue };
                            let d_tmp3 = tm::x0y2_x1y0_x2y1(&d_tmp2, d_b_t)?;
                            let key = (aa01, *ab2);
                            Self::add_weighted(partial, coefficients, (label, aa01, aa2, ab01, ab2), key, &d_tmp3)?;
                        }
                    }
                }
            },
            Loop3Label::A0b0A2b2 => {
                for aa2 in parallel.list_aa2() {
                    let Some(d_a_t) = find(&self.ds_a_t, aa01, aa2) else { continue };
                    for ab2 in parallel.list_ab2() {
                        let Some(d_a2b2) = lri.get_ds_rel(DsLabel::A2b2, aa2, ab2) else { continue };
                        let d_tmp1 = tm::x1y0y1_x0y2(d_a2b2, d_a_t)?;
                        for ab01 in parallel.list_ab01() {
                            let Some(d_b_t) = find_rel(&self.ds_b_t, ab01, ab2, period) else { continue };
                            let Some(d_a0b0) = lri.get_ds(DsLabel::A0b0, aa01, ab01) else { continue };
                            let d_tmp2 = tm::x1y0y1_x0y2(d_a0b0, &d_tmp1)?;
                            let d_tmp3 = tm::x2y0_x0y1_x1y2(&d_tmp2, d_b_t)?;
                            let key = (aa01, *ab01);
                            Self::add_weighted(partial, coefficients, (label, aa01, aa2, ab01, ab2), key, &d_tmp3)?;
                        }
                    }
                }
            },
        }
        Ok(())
    }
}

/* #endregion */

impl Lri {
    /// `ds_result[0] += fac_add_ds * (contraction of every pattern in labels)`.
    ///
    /// Result keys per pattern:
    /// - `a0b0_a1b1`: `[Aa2.atom][(Ab2.atom, Ab2.cell - Aa2.cell)]`
    /// - `a0b0_a1b2`: `[Aa2.atom][(Ab01.atom, Ab01.cell - Aa2.cell)]`
    /// - `a0b0_a2b1`: `[Aa01][Ab2]`
    /// - `a0b0_a2b2`: `[Aa01][Ab01]`
    ///
    /// Missing families or blocks only skip work. Only slot 0 of `ds_result` is
    /// written; an empty `ds_result` is given one slot. Contributions are summed in
    /// a fixed order, so the result does not depend on the number of threads.
    pub fn cal_loop3(&self, labels: &[Loop3Label], ds_result: &mut Vec<Ds>, fac_add_ds: f64) -> Result<()> {
        let time = Instant::now();
        if ds_result.is_empty() {
            ds_result.resize_with(1, Ds::new);
        }

        let ctx = Loop3Context::new(self, labels)?;
        let units = ctx.schedule(labels);
        let cursor = LoopCursor::default();
        let merger = ResultMerger::new(ds_result, fac_add_ds);

        (0..rayon::current_num_threads()).into_par_iter().try_for_each(|_| -> Result<()> {
            let mut backlog: Vec<UnitResult> = vec![];
            while let Some(iunit) = cursor.claim(units.len()) {
                backlog.push((iunit, vec![ctx.loop3(units[iunit])?]));
                merger.try_merge(&mut backlog)?;
            }
            merger.wait_merge(backlog)
        })?;
        merger.finish(units.len())?;

        log::debug!("Time elapsed (cal_loop3 [{}]): {:.3?}", labels.iter().join(", "), time.elapsed());
        Ok(())
    }

    /// Same contractions as [`Lri::cal_loop3`], with every elementary contribution
    /// of keys `(Aa01, Aa2, Ab01, Ab2)` added into slot `i` of `ds_result` weighted
    /// by `coefficients[i]`.
    ///
    /// `ds_result` is resized to `coefficients.len()` slots.
    pub fn cal(&self, labels: &[Loop3Label], ds_result: &mut Vec<Ds>, coefficients: &[Coefficient]) -> Result<()> {
        let time = Instant::now();
        let nslot = coefficients.len();
        ds_result.resize_with(nslot, Ds::new);
        if nslot == 0 {
            return Ok(());
        }

        let ctx = Loop3Context::new(self, labels)?;
        let list_aa01 = self.parallel.list_aa01();
        let units = labels.iter().cartesian_product(list_aa01).collect_vec();
        let cursor = LoopCursor::default();
        let merger = ResultMerger::new(ds_result, 1.0);

        (0..rayon::current_num_threads()).into_par_iter().try_for_each(|_| -> Result<()> {
            let mut backlog: Vec<UnitResult> = vec![];
            while let Some(iunit) = cursor.claim(units.len()) {
                let (&label, &aa01) = units[iunit];
                let mut partial = vec![Ds::new(); nslot];
                ctx.cal(label, aa01, coefficients, &mut partial)?;
                backlog.push((iunit, partial));
                merger.try_merge(&mut backlog)?;
            }
            merger.wait_merge(backlog)
        })?;
        merger.finish(units.len())?;

        log::debug!("Time elapsed (cal [{}], {nslot} slots): {:.3?}", labels.iter().join(", "), time.elapsed());
        Ok(())
    }
}
