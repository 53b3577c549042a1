#![allow(clippy::needless_range_loop)]

pub mod prelude;

pub mod blas;
pub mod cal_aux;
pub mod cell_nearest;
pub mod error;
pub mod exx;
pub mod loop3;
pub mod lri;
pub mod structs;
pub mod tensor;
pub mod tensor_multiply;
pub mod util;

#[test]
fn playground_loop3() {
    use crate::prelude::*;
    use crate::util::{SyntheticSystem, ds_stats};
    use rand::SeedableRng;
    use std::sync::Arc;

    let sys = SyntheticSystem::chain(vec![4, 3, 5], vec![8, 6, 9], [3, 2, 1], 1.6);
    let mut rng = rand::rngs::StdRng::seed_from_u64(2022);
    let mut lri = Lri::new(sys.period, Box::new(sys.distribute())).unwrap();
    let cs = Arc::new(sys.random_cs(&mut rng, 0.5).unwrap());
    let ds = Arc::new(sys.random_ds(&mut rng, 0.5).unwrap());
    lri.set_ds(DsLabel::A, cs.clone());
    lri.set_ds(DsLabel::B, cs);
    lri.set_ds(DsLabel::A0b0, Arc::new(sys.random_vs(&mut rng, 0.5).unwrap()));
    for label in [DsLabel::A1b1, DsLabel::A1b2, DsLabel::A2b1, DsLabel::A2b2] {
        lri.set_ds(label, ds.clone());
    }

    let time = std::time::Instant::now();
    let mut hs_vec = vec![];
    lri.cal_loop3(&Loop3Label::ALL, &mut hs_vec, 1.0).unwrap();
    let (nblock, nelem) = ds_stats(&hs_vec[0]);
    println!("Hs blocks: {nblock}, elements: {nelem}");
    println!("Energy: {:20.12}", crate::exx::cal_energy(&ds, &hs_vec[0]).unwrap());
    println!("Time elapsed (playground_loop3): {:.3?}", time.elapsed());
}

#[test]
fn playground_exx() {
    use crate::prelude::*;
    use crate::util::SyntheticSystem;
    use rand::SeedableRng;

    let sys = SyntheticSystem::chain(vec![3, 2], vec![5, 4], [2, 2, 1], 1.9);
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut exx = Exx::new(sys.atoms_pos.clone(), sys.latvec, sys.period, ExxConfig::default()).unwrap();
    exx.set_cs(&sys.random_cs(&mut rng, 0.7).unwrap()).unwrap();
    exx.set_vs(&sys.random_vs(&mut rng, 0.7).unwrap()).unwrap();
    exx.set_ds(&sys.random_ds(&mut rng, 0.7).unwrap()).unwrap();
    exx.set_dcs(&std::array::from_fn(|_| sys.random_cs(&mut rng, 0.7).unwrap())).unwrap();
    exx.set_dvs(&std::array::from_fn(|_| sys.random_vs(&mut rng, 0.7).unwrap())).unwrap();

    println!("EXX energy: {:20.12}", exx.cal_hs().unwrap());
    exx.cal_force().unwrap();
    for (ipos, force) in exx.force.iter().enumerate() {
        println!("force[{ipos}]: {force:?}");
    }
    exx.cal_stress().unwrap();
    println!("stress: {:?}", exx.stress);
}
