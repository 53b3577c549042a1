use crate::error::Result;
use crate::prelude::*;
use itertools::iproduct;
use std::collections::BTreeMap;
use std::sync::Arc;

/* #region partition */

pub trait Distribute: Send + Sync {
    fn list_aa01(&self) -> &[Atom];
    fn list_aa2(&self) -> &[AtomCell];
    fn list_ab01(&self) -> &[AtomCell];
    fn list_ab2(&self) -> &[AtomCell];
}

#[derive(Debug, Clone)]
pub struct SerialDistribute {
    atoms: Vec<Atom>,
    atom_cells: Vec<AtomCell>,
}

impl SerialDistribute {
    pub fn new(atoms: impl IntoIterator<Item = Atom>, period: &Cell) -> Self {
        let atoms = atoms.into_iter().collect::<Vec<_>>();
        let cells = iproduct!(0..period[0], 0..period[1], 0..period[2]).map(|(i, j, k)| [i, j, k]).collect::<Vec<_>>();
        let atom_cells = iproduct!(atoms.iter().copied(), cells).collect();
        Self { atoms, atom_cells }
    }
}

impl Distribute for SerialDistribute {
    fn list_aa01(&self) -> &[Atom] {
        &self.atoms
    }

    fn list_aa2(&self) -> &[AtomCell] {
        &self.atom_cells
    }

    fn list_ab01(&self) -> &[AtomCell] {
        &self.atom_cells
    }

    fn list_ab2(&self) -> &[AtomCell] {
        &self.atom_cells
    }
}

/* #endregion */

pub struct Lri {
    pub period: Cell,
    pub parallel: Box<dyn Distribute>,
    ds_ab: BTreeMap<DsLabel, Arc<Ds>>,
}

impl Lri {
    pub fn new(period: Cell, parallel: Box<dyn Distribute>) -> Result<Self> {
        check_period(&period)?;
        Ok(Self { period, parallel, ds_ab: BTreeMap::new() })
    }

    pub fn filter_ds(ds: &Ds, threshold: f64) -> Result<Ds> {
        let mut ds_new = Ds::new();
        for (&a, ds_a) in ds {
            let mut ds_a_new = DsMap::new();
            for (&b, block) in ds_a {
                if !block.is_empty() && block.max_abs()? > threshold {
                    ds_a_new.insert(b, block.clone());
                }
            }
            if !ds_a_new.is_empty() {
                ds_new.insert(a, ds_a_new);
            }
        }
        Ok(ds_new)
    }

    pub fn set_ds(&mut self, label: DsLabel, ds: Arc<Ds>) {
        self.ds_ab.insert(label, ds);
    }

    pub fn ds(&self, label: DsLabel) -> Option<&Ds> {
        self.ds_ab.get(&label).map(|ds| ds.as_ref())
    }

    pub fn get_ds(&self, label: DsLabel, a: Atom, b: &AtomCell) -> Option<&Block> {
        find(self.ds(label)?, a, b)
    }

    pub fn get_ds_rel(&self, label: DsLabel, a: &AtomCell, b: &AtomCell) -> Option<&Block> {
        find_rel(self.ds(label)?, a, b, &self.period)
    }
}

pub fn find<'a>(ds: &'a Ds, a: Atom, b: &AtomCell) -> Option<&'a Block> {
    ds.get(&a)?.get(b).filter(|block| !block.is_empty())
}

pub fn find_rel<'a>(ds: &'a Ds, a: &AtomCell, b: &AtomCell, period: &Cell) -> Option<&'a Block> {
    find(ds, a.0, &(b.0, cell_sub(&b.1, &a.1, period)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_serial_distribute() {
        let dist = SerialDistribute::new([0, 1], &[2, 1, 3]);
        assert_eq!(dist.list_aa01(), &[0, 1]);
        assert_eq!(dist.list_aa2().len(), 12);
        assert_eq!(dist.list_ab2()[0], (0, [0, 0, 0]));
        assert_eq!(dist.list_ab2()[11], (1, [1, 0, 2]));
    }

    #[test]
    fn test_lookup_and_filter() {
        let period = [2, 1, 1];
        let mut ds = Ds::new();
        ds.entry(0).or_default().insert((1, [1, 0, 0]), Block::new(vec![1, 1], vec![0.5]).unwrap());
        ds.entry(0).or_default().insert((0, [0, 0, 0]), Block::new(vec![1, 1], vec![1e-8]).unwrap());
        ds.entry(1).or_default().insert((1, [0, 0, 0]), Block::default());

        let mut lri = Lri::new(period, Box::new(SerialDistribute::new([0, 1], &period))).unwrap();
        lri.set_ds(DsLabel::A0b0, Arc::new(Lri::filter_ds(&ds, 1e-6).unwrap()));

        assert!(lri.get_ds(DsLabel::A0b0, 0, &(1, [1, 0, 0])).is_some());
        assert!(lri.get_ds(DsLabel::A0b0, 0, &(0, [0, 0, 0])).is_none());
        assert!(lri.ds(DsLabel::A0b0).unwrap().get(&1).is_none());
        assert!(lri.get_ds(DsLabel::A1b1, 0, &(1, [1, 0, 0])).is_none());

        // (1, [1]) seen from (0, [1]) is (1, [0]); seen from (0, [0]) it is (1, [1])
        assert!(lri.get_ds_rel(DsLabel::A0b0, &(0, [0, 0, 0]), &(1, [1, 0, 0])).is_some());
        assert!(lri.get_ds_rel(DsLabel::A0b0, &(0, [1, 0, 0]), &(1, [0, 0, 0])).is_some());
        assert!(lri.get_ds_rel(DsLabel::A0b0, &(0, [1, 0, 0]), &(1, [1, 0, 0])).is_none());
    }

    #[test]
    fn test_new_rejects_empty_period() {
        for period in [[0, 1, 1], [2, -1, 3]] {
            let res = Lri::new(period, Box::new(SerialDistribute::new([0], &[1, 1, 1])));
            assert!(matches!(res, Err(RiError::InvalidArgument(_))));
        }
    }
}
