// build.rs

use glob::glob;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A fixture discovered in the data directory.
#[derive(Debug)]
struct FixtureFile {
    pub name: String,
    pub path: PathBuf,
}

/// Discovers all family fixtures by scanning `data/families/`.
fn get_all_fixtures() -> Vec<FixtureFile> {
    glob("data/families/*.json")
        .expect("Failed to read glob pattern")
        .filter_map(Result::ok)
        .filter_map(|path| {
            let name = path
                .file_stem()?
                .to_string_lossy()
                .replace(|c: char| !c.is_ascii_alphanumeric(), "_")
                .to_lowercase();
            Some(FixtureFile { name, path })
        })
        .collect()
}

fn main() {
    println!("cargo:rerun-if-changed=data/families");

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("fixture_tests.rs");
    let mut file = BufWriter::new(File::create(&dest_path).unwrap());
    let root = env::var("CARGO_MANIFEST_DIR").unwrap();

    // One `#[test]` per fixture, each delegating to `run_fixture_test`.
    for fixture in get_all_fixtures() {
        let path = Path::new(&root).join(&fixture.path);
        writeln!(
            file,
            r#"
#[test]
fn fixture_{name}() -> anyhow::Result<()> {{
    run_fixture_test("{path}")
}}
"#,
            name = fixture.name,
            path = path.to_string_lossy().escape_default(),
        )
        .unwrap();
    }
}
