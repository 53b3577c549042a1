use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use ri_exx_loop3::error::Result;
use ri_exx_loop3::prelude::*;
use ri_exx_loop3::util::{SyntheticSystem, check_density, ds_stats};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct CliParser {
    #[clap(long, global = true, help = "Number of worker threads (default: all cores)")]
    threads: Option<usize>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SystemArgs {
    #[clap(long, default_value_t = 4, help = "Number of atoms in the periodic chain")]
    natom: usize,

    #[clap(long, default_value_t = 4, help = "Orbital basis functions per atom")]
    nao: usize,

    #[clap(long, default_value_t = 10, help = "Auxiliary basis functions per atom")]
    naux: usize,

    #[clap(long, num_args = 1.., value_delimiter = ',', default_values_t = [2, 2, 1], help = "Born-von Karman period, e.g. 2,2,1")]
    period: Vec<i32>,

    #[clap(long, default_value_t = 0.6, help = "Probability that a block is present")]
    density: f64,

    #[clap(long, default_value_t = 42, help = "Seed of the random families")]
    seed: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[clap(name = "loop3", about = "Run loop3 contraction patterns on a synthetic periodic system")]
    Loop3 {
        #[clap(flatten)]
        system: SystemArgs,

        #[clap(long, value_delimiter = ',', default_values_t = Loop3Label::ALL, help = "Patterns, e.g. a0b0_a1b1,a0b0_a2b2")]
        labels: Vec<Loop3Label>,
    },

    #[clap(name = "exx", about = "Run EXX energy (and optionally force/stress) on a synthetic periodic system")]
    Exx {
        #[clap(flatten)]
        system: SystemArgs,

        #[clap(long, help = "Also compute forces")]
        force: bool,

        #[clap(long, help = "Also compute stress")]
        stress: bool,
    },
}

fn build_system(args: &SystemArgs) -> Result<SyntheticSystem> {
    let period: Cell = args
        .period
        .as_slice()
        .try_into()
        .map_err(|_| RiError::InvalidArgument(format!("period needs {NDIM} components, got {:?}", args.period)))?;
    check_period(&period)?;
    check_density(args.density)?;
    Ok(SyntheticSystem::chain(vec![args.nao; args.natom], vec![args.naux; args.natom], period, 1.5))
}

fn random_components(mut family: impl FnMut() -> Result<Ds>) -> Result<[Ds; NPOS]> {
    let mut dss: [Ds; NPOS] = Default::default();
    for ds in dss.iter_mut() {
        *ds = family()?;
    }
    Ok(dss)
}

fn run_loop3(system: &SystemArgs, labels: &[Loop3Label]) -> Result<()> {
    let sys = build_system(system)?;
    let mut rng = StdRng::seed_from_u64(system.seed);
    let mut lri = Lri::new(sys.period, Box::new(sys.distribute()))?;
    let cs = Arc::new(sys.random_cs(&mut rng, system.density)?);
    let ds = Arc::new(sys.random_ds(&mut rng, system.density)?);
    lri.set_ds(DsLabel::A, cs.clone());
    lri.set_ds(DsLabel::B, cs.clone());
    lri.set_ds(DsLabel::A0b0, Arc::new(sys.random_vs(&mut rng, system.density)?));
    for label in [DsLabel::A1b1, DsLabel::A1b2, DsLabel::A2b1, DsLabel::A2b2] {
        lri.set_ds(label, ds.clone());
    }
    let (nblock, nelem) = ds_stats(&cs);
    log::info!("Cs blocks: {nblock}, elements: {nelem}");

    let time = std::time::Instant::now();
    let mut ds_result = vec![];
    lri.cal_loop3(labels, &mut ds_result, 1.0)?;
    let (nblock, nelem) = ds_stats(&ds_result[0]);
    println!("Result blocks: {nblock}, elements: {nelem}");
    println!("D . result: {:20.12}", ri_exx_loop3::exx::cal_energy(&ds, &ds_result[0])?);
    println!("Elapsed time for cal_loop3: {:.2?}", time.elapsed());
    Ok(())
}

fn run_exx(system: &SystemArgs, force: bool, stress: bool) -> Result<()> {
    let sys = build_system(system)?;
    let mut rng = StdRng::seed_from_u64(system.seed);
    let mut exx = Exx::new(sys.atoms_pos.clone(), sys.latvec, sys.period, ExxConfig::default())?;
    exx.set_cs(&sys.random_cs(&mut rng, system.density)?)?;
    exx.set_vs(&sys.random_vs(&mut rng, system.density)?)?;
    exx.set_ds(&sys.random_ds(&mut rng, system.density)?)?;

    let time = std::time::Instant::now();
    println!("EXX energy: {:20.12}", exx.cal_hs()?);
    if force || stress {
        exx.set_dcs(&random_components(|| sys.random_cs(&mut rng, system.density))?)?;
        exx.set_dvs(&random_components(|| sys.random_vs(&mut rng, system.density))?)?;
    }
    if force {
        exx.cal_force()?;
        for (ipos, force) in exx.force.iter().enumerate() {
            println!("force[{ipos}]: {force:?}");
        }
    }
    if stress {
        exx.cal_stress()?;
        for (ipos, row) in exx.stress.iter().enumerate() {
            println!("stress[{ipos}]: {row:?}");
        }
    }
    println!("Elapsed time for EXX: {:.2?}", time.elapsed());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CliParser::parse();

    if let Some(nthreads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(nthreads)
            .build_global()
            .map_err(|err| RiError::InvalidArgument(err.to_string()))?;
    }

    match args.command {
        Command::Loop3 { system, labels } => run_loop3(&system, &labels),
        Command::Exx { system, force, stress } => run_exx(&system, force, stress),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn system_args(period: Vec<i32>, density: f64) -> SystemArgs {
        SystemArgs { natom: 2, nao: 2, naux: 3, period, density, seed: 0 }
    }

    #[test]
    fn test_build_system_validation() {
        assert!(build_system(&system_args(vec![2, 1, 1], 0.5)).is_ok());
        for args in [
            system_args(vec![2, 1], 0.5),
            system_args(vec![0, 1, 1], 0.5),
            system_args(vec![2, 1, 1], 1.5),
            system_args(vec![2, 1, 1], -0.5),
        ] {
            assert!(matches!(build_system(&args), Err(RiError::InvalidArgument(_))));
        }
    }
}
