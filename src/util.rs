use crate::error::Result;
use crate::prelude::*;
use itertools::iproduct;
use rand::Rng;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SyntheticSystem {
    pub nao: Vec<usize>,
    pub naux: Vec<usize>,
    pub period: Cell,
    pub atoms_pos: BTreeMap<Atom, Pos>,
    pub latvec: [Pos; NDIM],
}

impl SyntheticSystem {
    pub fn chain(nao: Vec<usize>, naux: Vec<usize>, period: Cell, spacing: f64) -> Self {
        assert_eq!(nao.len(), naux.len());
        let natom = nao.len();
        let atoms_pos = (0..natom).map(|iat| (iat, [spacing * iat as f64, 0.1 * iat as f64, 0.0])).collect();
        let latvec = [[spacing * natom as f64, 0.0, 0.0], [0.0, 4.0 * spacing, 0.0], [0.0, 0.0, 4.0 * spacing]];
        Self { nao, naux, period, atoms_pos, latvec }
    }

    pub fn natom(&self) -> usize {
        self.nao.len()
    }

    pub fn atoms(&self) -> std::ops::Range<Atom> {
        0..self.natom()
    }

    pub fn cells(&self) -> Vec<Cell> {
        let p = self.period;
        iproduct!(0..p[0], 0..p[1], 0..p[2]).map(|(i, j, k)| [i, j, k]).collect()
    }

    pub fn distribute(&self) -> SerialDistribute {
        SerialDistribute::new(self.atoms(), &self.period)
    }

    pub fn random_family(
        &self,
        rng: &mut impl Rng,
        density: f64,
        shape: impl Fn(Atom, Atom) -> Vec<usize>,
    ) -> Result<Ds> {
        check_density(density)?;
        let mut ds = Ds::new();
        for (a, b, cell) in iproduct!(self.atoms(), self.atoms(), self.cells()) {
            if !rng.gen_bool(density) {
                continue;
            }
            let block = Block::from_fn(shape(a, b), |_| rng.gen_range(-1.0..1.0))?;
            ds.entry(a).or_default().insert((b, cell), block);
        }
        Ok(ds)
    }

    pub fn random_cs(&self, rng: &mut impl Rng, density: f64) -> Result<Ds> {
        self.random_family(rng, density, |a, b| vec![self.naux[a], self.nao[a], self.nao[b]])
    }

    pub fn random_vs(&self, rng: &mut impl Rng, density: f64) -> Result<Ds> {
        self.random_family(rng, density, |a, b| vec![self.naux[a], self.naux[b]])
    }

    pub fn random_ds(&self, rng: &mut impl Rng, density: f64) -> Result<Ds> {
        self.random_family(rng, density, |a, b| vec![self.nao[a], self.nao[b]])
    }
}

pub fn check_density(density: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&density) {
        return Err(RiError::InvalidArgument(format!("density must lie in [0, 1], got {density}")));
    }
    Ok(())
}

pub fn ds_stats(ds: &Ds) -> (usize, usize) {
    ds.values().flat_map(|ds_a| ds_a.values()).fold((0, 0), |(nblock, nelem), block| (nblock + 1, nelem + block.size()))
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_random_family_shapes() {
        let sys = SyntheticSystem::chain(vec![2, 1], vec![3, 2], [2, 1, 1], 1.5);
        let mut rng = StdRng::seed_from_u64(7);
        let cs = sys.random_cs(&mut rng, 1.0).unwrap();
        assert_eq!(ds_stats(&cs).0, 8);
        assert_eq!(cs[&0][&(1, [1, 0, 0])].shape(), &[3, 2, 1]);
        let vs = sys.random_vs(&mut rng, 1.0).unwrap();
        assert_eq!(vs[&1][&(0, [0, 0, 0])].shape(), &[2, 3]);
        let ds = sys.random_ds(&mut rng, 0.0).unwrap();
        assert!(ds.is_empty());
    }

    #[test]
    fn test_density_out_of_range() {
        let sys = SyntheticSystem::chain(vec![1], vec![1], [1, 1, 1], 1.0);
        let mut rng = StdRng::seed_from_u64(0);
        for density in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(sys.random_ds(&mut rng, density), Err(RiError::InvalidArgument(_))));
        }
        assert!(check_density(0.0).is_ok());
        assert!(check_density(1.0).is_ok());
    }
}
