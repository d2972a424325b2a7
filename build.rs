//! Build script for the tunetrim service.
//!
//! Copies the `.env.example` template into the user's local data directory so a
//! fresh install has a configuration skeleton where `config::load_env` looks for it.

use std::{env, fs, path::PathBuf};

/// Copies `.env.example` from the crate root into the local data directory.
///
/// # Destination
///
/// - Linux: `~/.local/share/tunetrim/.env.example`
/// - macOS: `~/Library/Application Support/tunetrim/.env.example`
/// - Windows: `%LOCALAPPDATA%/tunetrim/.env.example`
///
/// Nothing here is fatal: a missing template or an unwritable data directory
/// only produces a cargo warning.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=.env.example");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let env_example_path = manifest_dir.join(".env.example");

    let mut out_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    out_dir.push("tunetrim");

    if env_example_path.is_file() {
        let copied = fs::create_dir_all(&out_dir).and_then(|_| {
            let contents = fs::read_to_string(&env_example_path)?;
            fs::write(out_dir.join(".env.example"), contents)
        });
        if let Err(e) = copied {
            println!(
                "cargo:warning=could not copy .env.example to {}: {}",
                out_dir.display(),
                e
            );
        }
    } else {
        println!(
            "cargo:warning=.env.example not found at {}",
            env_example_path.display()
        );
    }

    Ok(())
}
