use crate::error::Result;
use crate::prelude::*;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Mutex, TryLockError};

/* #region add_ds */

pub trait AddDs: Sized {
    fn is_empty_ds(&self) -> bool;
    fn scale_ds(&mut self, fac: f64) -> Result<()>;
    fn add_ds(&mut self, src: Self, fac: f64) -> Result<()>;
}

impl AddDs for Block {
    fn is_empty_ds(&self) -> bool {
        self.is_empty()
    }

    fn scale_ds(&mut self, fac: f64) -> Result<()> {
        self.scale(fac)
    }

    fn add_ds(&mut self, mut src: Self, fac: f64) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            src.scale(fac)?;
            *self = src;
            return Ok(());
        }
        self.add_scaled(&src, fac)
    }
}

impl<K: Ord, V: AddDs + Default> AddDs for BTreeMap<K, V> {
    fn is_empty_ds(&self) -> bool {
        self.values().all(|v| v.is_empty_ds())
    }

    fn scale_ds(&mut self, fac: f64) -> Result<()> {
        self.values_mut().try_for_each(|v| v.scale_ds(fac))
    }

    fn add_ds(&mut self, src: Self, fac: f64) -> Result<()> {
        for (key, value) in src {
            if value.is_empty_ds() {
                continue;
            }
            self.entry(key).or_default().add_ds(value, fac)?;
        }
        Ok(())
    }
}

/* #endregion */

/* #region re-keying */

pub fn cal_ds_transpose(ds: &Ds) -> Result<Ds> {
    ds.iter()
        .map(|(&a, ds_a)| {
            let ds_a_t = ds_a
                .iter()
                .map(|(&b, block)| Ok((b, block.transpose_01()?)))
                .collect::<Result<DsMap>>()?;
            Ok((a, ds_a_t))
        })
        .collect()
}

pub fn ds_translate(ds: DsMap, shift: &Cell, period: &Cell) -> Result<DsMap> {
    let mut ds_new = DsMap::new();
    for ((b, cell), block) in ds {
        let key = (b, cell_sub(&cell, shift, period));
        match ds_new.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(block);
            },
            Entry::Occupied(mut entry) => entry.get_mut().add_ds(block, 1.0)?,
        }
    }
    Ok(ds_new)
}

pub fn ds_exchange(ds: DsMap, pivot: &AtomCell, period: &Cell) -> Result<Ds> {
    let mut ds_new = Ds::new();
    for ((a, cell), block) in ds {
        let key = (pivot.0, cell_sub(&pivot.1, &cell, period));
        ds_new.entry(a).or_default().add_ds(BTreeMap::from([(key, block)]), 1.0)?;
    }
    Ok(ds_new)
}

/* #endregion */

/* #region merge of work-unit results */

pub type UnitResult = (usize, Vec<Ds>);

struct MergeState<'a> {
    shared: &'a mut Vec<Ds>,
    next: usize,
    pending: BTreeMap<usize, Vec<Ds>>,
}

impl MergeState<'_> {
    fn absorb(&mut self, backlog: &mut Vec<UnitResult>, fac: f64) -> Result<()> {
        self.pending.extend(backlog.drain(..));
        while let Some(partial) = self.pending.remove(&self.next) {
            if self.shared.len() < partial.len() {
                return Err(RiError::ShapeMismatch {
                    op: "ResultMerger::merge",
                    lhs: vec![self.shared.len()],
                    rhs: vec![partial.len()],
                });
            }
            for (dst, src) in self.shared.iter_mut().zip(partial) {
                dst.add_ds(src, fac)?;
            }
            self.next += 1;
        }
        Ok(())
    }
}

/// Adds unit results into the shared slots strictly in schedule order `0..n`,
/// whichever worker produced them. Every unit hands in exactly one result.
pub struct ResultMerger<'a> {
    state: Mutex<MergeState<'a>>,
    fac: f64,
}

impl<'a> ResultMerger<'a> {
    pub fn new(shared: &'a mut Vec<Ds>, fac: f64) -> Self {
        let state = MergeState { shared, next: 0, pending: BTreeMap::new() };
        Self { state: Mutex::new(state), fac }
    }

    pub fn try_merge(&self, backlog: &mut Vec<UnitResult>) -> Result<bool> {
        if backlog.is_empty() {
            return Ok(true);
        }
        match self.state.try_lock() {
            Ok(mut state) => state.absorb(backlog, self.fac).map(|_| true),
            Err(TryLockError::WouldBlock) => Ok(false),
            Err(TryLockError::Poisoned(_)) => Err(RiError::LockPoisoned),
        }
    }

    pub fn wait_merge(&self, mut backlog: Vec<UnitResult>) -> Result<()> {
        if backlog.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().map_err(|_| RiError::LockPoisoned)?;
        state.absorb(&mut backlog, self.fac)
    }

    pub fn finish(self, nunit: usize) -> Result<()> {
        let state = self.state.into_inner().map_err(|_| RiError::LockPoisoned)?;
        if state.next != nunit || !state.pending.is_empty() {
            return Err(RiError::InvalidArgument(format!(
                "merged {} of {nunit} work units, {} still queued",
                state.next,
                state.pending.len()
            )));
        }
        Ok(())
    }
}

/* #endregion */

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn block(shape: &[usize], offset: f64) -> Block {
        Block::from_fn(shape.to_vec(), |idx| {
            offset + idx.iter().enumerate().map(|(i, &x)| ((i + 1) * x) as f64).sum::<f64>()
        })
        .unwrap()
    }

    fn assert_ds_eq(lhs: &Ds, rhs: &Ds) {
        assert_eq!(lhs.keys().collect::<Vec<_>>(), rhs.keys().collect::<Vec<_>>());
        for (a, ds_a) in lhs {
            assert_eq!(ds_a.keys().collect::<Vec<_>>(), rhs[a].keys().collect::<Vec<_>>());
            for (b, block) in ds_a {
                let other = &rhs[a][b];
                assert_eq!(block.shape(), other.shape());
                block.raw().iter().zip(other.raw()).for_each(|(x, y)| assert_abs_diff_eq!(x, y, epsilon = 1e-12));
            }
        }
    }

    fn sample_ds(offset: f64) -> Ds {
        let mut ds = Ds::new();
        ds.entry(0).or_default().insert((0, [0, 0, 0]), block(&[2, 3, 2], offset));
        ds.entry(0).or_default().insert((1, [1, 0, 0]), block(&[2, 3, 1], offset + 1.0));
        ds.entry(1).or_default().insert((0, [0, 0, 0]), block(&[1, 1, 2], offset + 2.0));
        ds
    }

    #[test]
    fn test_add_ds_associative_commutative() {
        let u = sample_ds(0.1);
        let v = sample_ds(-0.7);
        let mut w = sample_ds(2.3);
        w.entry(2).or_default().insert((2, [0, 0, 0]), block(&[1, 1, 1], 5.0));

        let mut uv = u.clone();
        uv.add_ds(v.clone(), 1.0).unwrap();
        let mut uv_w = uv.clone();
        uv_w.add_ds(w.clone(), 1.0).unwrap();

        let mut vw = v.clone();
        vw.add_ds(w.clone(), 1.0).unwrap();
        let mut u_vw = u.clone();
        u_vw.add_ds(vw, 1.0).unwrap();
        assert_ds_eq(&uv_w, &u_vw);

        let mut vu = v.clone();
        vu.add_ds(u.clone(), 1.0).unwrap();
        assert_ds_eq(&uv, &vu);
    }

    #[test]
    fn test_add_ds_scaled_and_vacant() {
        let mut dst = Ds::new();
        dst.add_ds(sample_ds(1.0), -2.0).unwrap();
        let expected = sample_ds(1.0);
        let block_dst = &dst[&0][&(0, [0, 0, 0])];
        let block_ref = &expected[&0][&(0, [0, 0, 0])];
        block_dst.raw().iter().zip(block_ref.raw()).for_each(|(x, y)| assert_abs_diff_eq!(*x, -2.0 * y));

        // empty source entries never create keys
        let mut src = Ds::new();
        src.entry(5).or_default().insert((5, [0, 0, 0]), Block::default());
        dst.add_ds(src, 1.0).unwrap();
        assert!(!dst.contains_key(&5));
    }

    #[test]
    fn test_transpose_round_trip() {
        let ds = sample_ds(0.5);
        let ds_t = cal_ds_transpose(&ds).unwrap();
        assert_eq!(ds_t[&0][&(0, [0, 0, 0])].shape(), &[3, 2, 2]);
        let ds_tt = cal_ds_transpose(&ds_t).unwrap();
        assert_ds_eq(&ds, &ds_tt);
    }

    #[test]
    fn test_translate_round_trip() {
        let period = [3, 2, 1];
        let ds = sample_ds(0.0).remove(&0).unwrap();
        let shift = [2, 1, 0];
        let ds_shift = ds_translate(ds.clone(), &shift, &period).unwrap();
        assert!(ds_shift.contains_key(&(0, [1, 1, 0])));
        assert!(ds_shift.contains_key(&(1, [2, 1, 0])));
        let ds_back = ds_translate(ds_shift, &cell_neg(&shift), &period).unwrap();
        assert_eq!(ds_back, ds);
    }

    #[test]
    fn test_exchange() {
        let period = [4, 1, 1];
        let mut ds = DsMap::new();
        ds.insert((2, [1, 0, 0]), block(&[1, 2], 0.0));
        ds.insert((3, [3, 0, 0]), block(&[1, 2], 1.0));
        ds.insert((3, [7, 0, 0]), block(&[1, 2], 0.5));
        let ds_ex = ds_exchange(ds, &(7, [2, 0, 0]), &period).unwrap();
        assert_eq!(ds_ex.len(), 2);
        assert_eq!(ds_ex[&2].len(), 1);
        assert_eq!(ds_ex[&2][&(7, [1, 0, 0])], block(&[1, 2], 0.0));
        // cells 3 and 7 coincide modulo the period and are summed
        assert_eq!(ds_ex[&3].len(), 1);
        assert_eq!(ds_ex[&3][&(7, [3, 0, 0])], Block::new(vec![1, 2], vec![1.5, 3.5]).unwrap());
    }

    #[test]
    fn test_merger_each_unit_once() {
        let mut shared = vec![Ds::new(); 2];
        {
            let merger = ResultMerger::new(&mut shared, 0.5);
            let mut backlog = vec![(0, vec![sample_ds(1.0), sample_ds(2.0)])];
            assert!(merger.try_merge(&mut backlog).unwrap());
            assert!(backlog.is_empty());
            merger.wait_merge(backlog).unwrap();
            merger.wait_merge(vec![(1, vec![sample_ds(1.0)])]).unwrap();
            merger.finish(2).unwrap();
        }
        let mut expected = sample_ds(1.0);
        expected.add_ds(sample_ds(1.0), 1.0).unwrap();
        expected.scale_ds(0.5).unwrap();
        assert_ds_eq(&shared[0], &expected);
        let mut expected = sample_ds(2.0);
        expected.scale_ds(0.5).unwrap();
        assert_ds_eq(&shared[1], &expected);
    }

    #[test]
    fn test_merger_schedule_order() {
        let units = [sample_ds(0.3), sample_ds(1e8), sample_ds(-1e8), sample_ds(0.7)];

        let mut in_order = vec![Ds::new()];
        {
            let merger = ResultMerger::new(&mut in_order, 1.0);
            for (iunit, ds) in units.iter().enumerate() {
                merger.wait_merge(vec![(iunit, vec![ds.clone()])]).unwrap();
            }
            merger.finish(units.len()).unwrap();
        }

        let mut shuffled = vec![Ds::new()];
        {
            let merger = ResultMerger::new(&mut shuffled, 1.0);
            merger.wait_merge(vec![(3, vec![units[3].clone()]), (1, vec![units[1].clone()])]).unwrap();
            merger.wait_merge(vec![(2, vec![units[2].clone()])]).unwrap();
            // unit 0 is still missing
            merger.wait_merge(vec![(0, vec![units[0].clone()])]).unwrap();
            merger.finish(units.len()).unwrap();
        }
        assert_eq!(in_order, shuffled);
    }

    #[test]
    fn test_merger_reports_missing_unit() {
        let mut shared = vec![Ds::new()];
        let merger = ResultMerger::new(&mut shared, 1.0);
        merger.wait_merge(vec![(1, vec![sample_ds(0.0)])]).unwrap();
        assert!(matches!(merger.finish(2), Err(RiError::InvalidArgument(_))));
    }
}
