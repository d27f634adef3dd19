//! Tapedeck CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use tapedeck::codec::{decode_request, decode_response};
use tapedeck::fingerprint::short_hex;
use tapedeck::storage::{FixtureReader, FIXTURE_EXTENSION};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = &args[1];

    let result = match command.as_str() {
        "inspect" => {
            if args.len() < 3 {
                eprintln!("Usage: tapedeck inspect <fixture>");
                process::exit(1);
            }
            inspect(Path::new(&args[2]))
        }
        "stats" => {
            if args.len() < 3 {
                eprintln!("Usage: tapedeck stats <fixtures-dir>");
                process::exit(1);
            }
            show_stats(&PathBuf::from(&args[2]))
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'tapedeck' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Tapedeck v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: tapedeck <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  inspect <fixture>   List the interactions stored in a fixture");
    eprintln!("  stats <dir>         Summarize all fixtures in a directory");
}

fn inspect(path: &Path) -> Result<()> {
    let reader = FixtureReader::open(path)
        .with_context(|| format!("Failed to open fixture {}", path.display()))?;

    println!("Fixture: {}", path.display());
    println!("Interactions: {}", reader.interaction_count());
    println!("Size: {} bytes", reader.file_size());
    println!();

    for (i, entry) in reader.entries_iter().enumerate() {
        let request = decode_request(reader.read_request(&entry)?)
            .with_context(|| format!("Failed to decode request {i}"))?;
        let response = decode_response(reader.read_response(&entry)?)
            .with_context(|| format!("Failed to decode response {i}"))?;

        println!(
            "{:>4}  {}  {} {} -> {}  (request {} B, response {} B)",
            i,
            short_hex(&entry.request_hash),
            request.method,
            request.url,
            response.status,
            request.body.len(),
            response.body.len()
        );
    }

    Ok(())
}

fn show_stats(dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut fixtures = 0u64;
    let mut interactions = 0u64;
    let mut bytes = 0u64;
    let mut unreadable = 0u64;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(FIXTURE_EXTENSION) {
            continue;
        }

        match FixtureReader::open(&path) {
            Ok(reader) => {
                fixtures += 1;
                interactions += reader.interaction_count();
                bytes += reader.file_size();
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {e}", path.display());
                unreadable += 1;
            }
        }
    }

    println!("Fixtures directory: {}", dir.display());
    println!();
    println!("Fixtures:     {fixtures}");
    println!("Interactions: {interactions}");
    println!("Bytes:        {bytes}");
    if unreadable > 0 {
        println!("Unreadable:   {unreadable}");
    }

    Ok(())
}
