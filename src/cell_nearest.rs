use crate::error::Result;
use crate::prelude::*;
use itertools::iproduct;
use std::collections::BTreeMap;

pub trait CellNearest: Send + Sync {
    fn cell_nearest(&self, a: Atom, b: Atom, cell: &Cell) -> Result<Cell>;
}

#[derive(Debug, Clone)]
pub struct MinimumImage {
    atoms_pos: BTreeMap<Atom, Pos>,
    latvec: [Pos; NDIM],
    period: Cell,
}

impl MinimumImage {
    pub fn new(atoms_pos: BTreeMap<Atom, Pos>, latvec: [Pos; NDIM], period: Cell) -> Self {
        Self { atoms_pos, latvec, period }
    }

    fn pos(&self, a: Atom) -> Result<&Pos> {
        self.atoms_pos.get(&a).ok_or_else(|| RiError::InvalidArgument(format!("no position for atom {a}")))
    }

    pub fn displacement(&self, a: Atom, b: Atom, cell: &Cell) -> Result<Pos> {
        let (pos_a, pos_b) = (self.pos(a)?, self.pos(b)?);
        Ok(std::array::from_fn(|ipos| {
            pos_b[ipos] - pos_a[ipos] + (0..NDIM).map(|d| cell[d] as f64 * self.latvec[d][ipos]).sum::<f64>()
        }))
    }
}

impl CellNearest for MinimumImage {
    fn cell_nearest(&self, a: Atom, b: Atom, cell: &Cell) -> Result<Cell> {
        let base = cell_mod(cell, &self.period);
        let p = self.period;
        let mut nearest = (f64::INFINITY, base);
        for (i, j, k) in iproduct!(-1..=1, -1..=1, -1..=1) {
            let image = [base[0] + i * p[0], base[1] + j * p[1], base[2] + k * p[2]];
            let dist2 = self.displacement(a, b, &image)?.iter().map(|x| x * x).sum::<f64>();
            if dist2 < nearest.0 {
                nearest = (dist2, image);
            }
        }
        Ok(nearest.1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::SyntheticSystem;

    #[test]
    fn test_minimum_image() {
        let sys = SyntheticSystem::chain(vec![1, 1], vec![1, 1], [3, 1, 1], 1.8);
        let nearest = MinimumImage::new(sys.atoms_pos.clone(), sys.latvec, sys.period);
        assert_eq!(nearest.cell_nearest(0, 1, &[0, 0, 0]).unwrap(), [0, 0, 0]);
        assert_eq!(nearest.cell_nearest(0, 1, &[2, 0, 0]).unwrap(), [-1, 0, 0]);
        assert_eq!(nearest.cell_nearest(0, 1, &[-1, 0, 0]).unwrap(), [-1, 0, 0]);
        assert_eq!(nearest.cell_nearest(1, 0, &[0, 0, 0]).unwrap(), [0, 0, 0]);
        assert_eq!(nearest.cell_nearest(1, 0, &[1, 0, 0]).unwrap(), [1, 0, 0]);
        assert!(matches!(nearest.cell_nearest(0, 7, &[0, 0, 0]), Err(RiError::InvalidArgument(_))));
    }
}
