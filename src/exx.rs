use crate::cell_nearest::{CellNearest, MinimumImage};
use crate::error::Result;
use crate::loop3::coefficient;
use crate::prelude::*;
use itertools::{Itertools, iproduct};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/* #region post-processing of two-center results */

pub fn cal_energy(ds: &Ds, hs: &Ds) -> Result<f64> {
    let mut energy = 0.0;
    for (a, hs_a) in hs {
        let Some(ds_a) = ds.get(a) else { continue };
        for (b, h) in hs_a {
            let Some(d) = ds_a.get(b) else { continue };
            if d.is_empty() || h.is_empty() {
                continue;
            }
            energy += d.dot(h)?;
        }
    }
    Ok(energy)
}

pub fn gather_force(ds: &Ds, dhs: &Ds, on_outer: bool, force: &mut BTreeMap<Atom, f64>) -> Result<()> {
    for (&a, dhs_a) in dhs {
        let Some(ds_a) = ds.get(&a) else { continue };
        for (b, dh) in dhs_a {
            let Some(d) = ds_a.get(b) else { continue };
            if d.is_empty() || dh.is_empty() {
                continue;
            }
            let atom = if on_outer { a } else { b.0 };
            *force.entry(atom).or_insert(0.0) += d.dot(dh)?;
        }
    }
    Ok(())
}

/* #endregion */

struct DisplacementTable {
    period: Cell,
    table: BTreeMap<(Atom, Atom, Cell), Pos>,
}

impl DisplacementTable {
    fn new(
        atoms: &BTreeSet<Atom>,
        atoms_pos: &BTreeMap<Atom, Pos>,
        latvec: &[Pos; NDIM],
        period: Cell,
        cell_nearest: &dyn CellNearest,
    ) -> Result<Self> {
        let pos = |a: Atom| atoms_pos.get(&a).ok_or_else(|| RiError::InvalidArgument(format!("no position for atom {a}")));
        let mut table = BTreeMap::new();
        for (&ax, &ay, (i, j, k)) in iproduct!(atoms, atoms, iproduct!(0..period[0], 0..period[1], 0..period[2])) {
            let cell = [i, j, k];
            let nearest = cell_nearest.cell_nearest(ax, ay, &cell)?;
            let (pos_x, pos_y) = (pos(ax)?, pos(ay)?);
            let delta: Pos = std::array::from_fn(|ipos| {
                pos_y[ipos] - pos_x[ipos] + (0..NDIM).map(|d| nearest[d] as f64 * latvec[d][ipos]).sum::<f64>()
            });
            table.insert((ax, ay, cell), delta);
        }
        Ok(Self { period, table })
    }

    fn get(&self, ax: Atom, ay: Atom, cell: &Cell, ipos: usize) -> f64 {
        self.table.get(&(ax, ay, cell_mod(cell, &self.period))).map_or(0.0, |delta| delta[ipos])
    }
}

pub struct Exx {
    pub config: ExxConfig,
    atoms_pos: BTreeMap<Atom, Pos>,
    latvec: [Pos; NDIM],
    lri: Lri,
    cell_nearest: Box<dyn CellNearest>,

    cs: Option<Arc<Ds>>,
    vs: Option<Arc<Ds>>,
    ds: Option<Arc<Ds>>,
    ds_filtered: Option<Arc<Ds>>,
    dcs: Option<[Arc<Ds>; NPOS]>,
    dvs: Option<[Arc<Ds>; NPOS]>,

    pub hs: Ds,
    pub energy: f64,
    pub force: [BTreeMap<Atom, f64>; NPOS],
    pub stress: [[f64; NPOS]; NPOS],
}

impl Exx {
    pub fn new(atoms_pos: BTreeMap<Atom, Pos>, latvec: [Pos; NDIM], period: Cell, config: ExxConfig) -> Result<Self> {
        let parallel = SerialDistribute::new(atoms_pos.keys().copied(), &period);
        let lri = Lri::new(period, Box::new(parallel))?;
        let cell_nearest = MinimumImage::new(atoms_pos.clone(), latvec, period);
        Ok(Self {
            config,
            atoms_pos,
            latvec,
            lri,
            cell_nearest: Box::new(cell_nearest),
            cs: None,
            vs: None,
            ds: None,
            ds_filtered: None,
            dcs: None,
            dvs: None,
            hs: Ds::new(),
            energy: 0.0,
            force: Default::default(),
            stress: [[0.0; NPOS]; NPOS],
        })
    }

    pub fn set_parallel(&mut self, parallel: Box<dyn Distribute>) {
        self.lri.parallel = parallel;
    }

    pub fn set_cell_nearest(&mut self, cell_nearest: Box<dyn CellNearest>) {
        self.cell_nearest = cell_nearest;
    }

    pub fn period(&self) -> &Cell {
        &self.lri.period
    }

    /* #region inputs */

    pub fn set_cs(&mut self, cs: &Ds) -> Result<()> {
        self.cs = Some(Arc::new(Lri::filter_ds(cs, self.config.threshold_c)?));
        Ok(())
    }

    pub fn set_vs(&mut self, vs: &Ds) -> Result<()> {
        self.vs = Some(Arc::new(Lri::filter_ds(vs, self.config.threshold_v)?));
        Ok(())
    }

    pub fn set_ds(&mut self, ds: &Ds) -> Result<()> {
        self.ds_filtered = Some(Arc::new(Lri::filter_ds(ds, self.config.threshold_d)?));
        self.ds = Some(Arc::new(ds.clone()));
        Ok(())
    }

    pub fn set_dcs(&mut self, dcs: &[Ds; NPOS]) -> Result<()> {
        self.dcs = Some(Self::filter_components(dcs, self.config.threshold_dc)?);
        Ok(())
    }

    pub fn set_dvs(&mut self, dvs: &[Ds; NPOS]) -> Result<()> {
        self.dvs = Some(Self::filter_components(dvs, self.config.threshold_dv)?);
        Ok(())
    }

    fn filter_components(dss: &[Ds; NPOS], threshold: f64) -> Result<[Arc<Ds>; NPOS]> {
        let mut filtered: [Arc<Ds>; NPOS] = Default::default();
        for (dst, ds) in filtered.iter_mut().zip(dss) {
            *dst = Arc::new(Lri::filter_ds(ds, threshold)?);
        }
        Ok(filtered)
    }

    fn require<T: Clone>(input: &Option<T>, name: &'static str) -> Result<T> {
        input.clone().ok_or(RiError::MissingInput(name))
    }

    fn bind(&mut self, a: &Arc<Ds>, a0b0: &Arc<Ds>, b: &Arc<Ds>) {
        self.lri.set_ds(DsLabel::A, a.clone());
        self.lri.set_ds(DsLabel::A0b0, a0b0.clone());
        self.lri.set_ds(DsLabel::B, b.clone());
    }

    fn bind_density(&mut self) -> Result<()> {
        let ds = Self::require(&self.ds_filtered, "Ds")?;
        for label in [DsLabel::A1b1, DsLabel::A1b2, DsLabel::A2b1, DsLabel::A2b2] {
            self.lri.set_ds(label, ds.clone());
        }
        Ok(())
    }

    /* #endregion */

    pub fn cal_hs(&mut self) -> Result<f64> {
        let time = Instant::now();
        let cs = Self::require(&self.cs, "Cs")?;
        let vs = Self::require(&self.vs, "Vs")?;
        let ds = Self::require(&self.ds, "Ds")?;
        self.bind_density()?;
        self.bind(&cs, &vs, &cs);

        let mut hs_vec = vec![Ds::new()];
        self.lri.cal_loop3(&Loop3Label::ALL, &mut hs_vec, 1.0)?;
        self.hs = hs_vec.remove(0);
        self.energy = cal_energy(&ds, &self.hs)?;

        log::info!("Time elapsed (cal_hs): {:.3?}", time.elapsed());
        log::info!("EXX energy: {:20.12}", self.energy);
        Ok(self.energy)
    }

    pub fn cal_force(&mut self) -> Result<()> {
        let time = Instant::now();
        let cs = Self::require(&self.cs, "Cs")?;
        let vs = Self::require(&self.vs, "Vs")?;
        let ds = Self::require(&self.ds, "Ds")?;
        let dcs = Self::require(&self.dcs, "dCs")?;
        let dvs = Self::require(&self.dvs, "dVs")?;
        self.bind_density()?;

        use Loop3Label::*;
        for ipos in 0..NPOS {
            let mut force_ipos = BTreeMap::new();

            // derivative on the outer atom of the pair
            let mut dhs_vec = vec![Ds::new()];
            self.bind(&dcs[ipos], &vs, &cs);
            self.lri.cal_loop3(&[A0b0A1b1, A0b0A1b2], &mut dhs_vec, -1.0)?;
            self.lri.cal_loop3(&[A0b0A2b1, A0b0A2b2], &mut dhs_vec, 1.0)?;
            self.bind(&cs, &dvs[ipos], &cs);
            self.lri.cal_loop3(&[A0b0A2b2, A0b0A2b1], &mut dhs_vec, 1.0)?;
            gather_force(&ds, &dhs_vec[0], true, &mut force_ipos)?;

            // derivative on the inner atom of the pair
            let mut dhs_vec = vec![Ds::new()];
            self.lri.cal_loop3(&[A0b0A2b2, A0b0A1b2], &mut dhs_vec, 1.0)?;
            self.bind(&cs, &vs, &dcs[ipos]);
            self.lri.cal_loop3(&[A0b0A1b1, A0b0A2b1], &mut dhs_vec, 1.0)?;
            self.lri.cal_loop3(&[A0b0A1b2, A0b0A2b2], &mut dhs_vec, -1.0)?;
            gather_force(&ds, &dhs_vec[0], false, &mut force_ipos)?;

            self.force[ipos] = force_ipos;
        }

        log::info!("Time elapsed (cal_force): {:.3?}", time.elapsed());
        Ok(())
    }

    pub fn cal_stress(&mut self) -> Result<()> {
        let time = Instant::now();
        let cs = Self::require(&self.cs, "Cs")?;
        let vs = Self::require(&self.vs, "Vs")?;
        let ds = Self::require(&self.ds, "Ds")?;
        let dcs = Self::require(&self.dcs, "dCs")?;
        let dvs = Self::require(&self.dvs, "dVs")?;
        self.bind_density()?;

        let parallel = self.lri.parallel.as_ref();
        let atoms = parallel
            .list_aa01()
            .iter()
            .copied()
            .chain([parallel.list_aa2(), parallel.list_ab01(), parallel.list_ab2()].into_iter().flatten().map(|ac| ac.0))
            .collect::<BTreeSet<_>>();
        let delta =
            DisplacementTable::new(&atoms, &self.atoms_pos, &self.latvec, *self.period(), self.cell_nearest.as_ref())?;
        let delta = &delta;
        let period = *self.period();

        let labels = [Loop3Label::A0b0A1b1, Loop3Label::A0b0A2b1];
        for ipos0 in 0..NPOS {
            let mut dhs_vec = vec![Ds::new(); NPOS];

            self.bind(&dcs[ipos0], &vs, &cs);
            let coefficients = (0..NPOS)
                .map(|ipos1| coefficient(move |_, aa01, aa2, _, _| delta.get(aa01, aa2.0, &aa2.1, ipos1)))
                .collect_vec();
            self.lri.cal(&labels, &mut dhs_vec, &coefficients)?;

            self.bind(&cs, &dvs[ipos0], &cs);
            let coefficients = (0..NPOS)
                .map(|ipos1| coefficient(move |_, aa01, _, ab01, _| delta.get(aa01, ab01.0, &ab01.1, ipos1)))
                .collect_vec();
            self.lri.cal(&labels, &mut dhs_vec, &coefficients)?;

            self.bind(&cs, &vs, &dcs[ipos0]);
            let coefficients = (0..NPOS)
                .map(|ipos1| {
                    coefficient(move |_, _, _, ab01, ab2| {
                        delta.get(ab01.0, ab2.0, &cell_sub(&ab2.1, &ab01.1, &period), ipos1)
                    })
                })
                .collect_vec();
            self.lri.cal(&labels, &mut dhs_vec, &coefficients)?;

            for (ipos1, dhs) in dhs_vec.iter().enumerate() {
                self.stress[ipos0][ipos1] = cal_energy(&ds, dhs)?;
            }
        }

        log::info!("Time elapsed (cal_stress): {:.3?}", time.elapsed());
        Ok(())
    }
}
