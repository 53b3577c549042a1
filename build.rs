#![allow(unused)]

use std::path::PathBuf;

/// Library directories from `:`-separated (`;` on Windows) environment paths,
/// followed by the usual system prefixes.
fn link_search_paths(env_candidates: &[&str]) -> Vec<PathBuf> {
    let split_char = if cfg!(windows) { ';' } else { ':' };
    let roots = env_candidates
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .flat_map(|paths| paths.split(split_char).map(str::to_string).collect::<Vec<_>>())
        .filter(|path| !path.is_empty())
        .chain(["/usr", "/usr/local", "/opt"].map(String::from))
        .map(PathBuf::from);
    roots
        .flat_map(|root| ["", "lib", "lib64", "lib/x86_64-linux-gnu"].map(|lib| root.join(lib)))
        .filter(|path| path.is_dir())
        .filter_map(|path| std::fs::canonicalize(path).ok())
        .collect()
}

fn link_openblas() {
    let env_candidates = ["RI_EXX_EXT_DIR", "LD_LIBRARY_PATH", "DYLD_LIBRARY_PATH"];
    println!("cargo:rerun-if-env-changed=RI_EXX_EXT_DIR");
    for path in link_search_paths(&env_candidates) {
        println!("cargo:rustc-link-search=native={}", path.display());
    }

    println!("cargo:rustc-link-lib=openblas");
    println!("cargo:rustc-link-lib=gomp");
}

fn main() {
    #[cfg(feature = "use_openblas")]
    link_openblas();
}
