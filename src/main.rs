mod args;
mod stats;

use crate::stats::Stats;

use std::fs::File;
use std::sync::mpsc::sync_channel;
use std::thread;

use clap::Parser;
use colored::*;
use log::info;
use memmap2::Mmap;

use osmxml::{EntityMask, FileFormat, FormatRegistry, ItemKind};

type Error = Box<dyn std::error::Error>;

const CHUNK_SIZE: usize = 1024 * 1024;
const INPUT_QUEUE_SIZE: usize = 8;

fn run(args: args::Args) -> Result<(), Error> {
    let input_file = File::open(&args.input)?;
    let input_data = unsafe { Mmap::map(&input_file)? };

    let mask = if args.changesets {
        EntityMask::ALL
    } else {
        EntityMask::OBJECT
    };

    let registry = FormatRegistry::with_defaults();
    let (chunk_tx, chunk_rx) = sync_channel(INPUT_QUEUE_SIZE);
    let mut reader = registry.create(FileFormat::Xml, mask, chunk_rx)?;

    let feeder = thread::spawn(move || {
        for chunk in input_data.chunks(CHUNK_SIZE) {
            if chunk_tx.send(chunk.to_vec()).is_err() {
                return;
            }
        }
        let _ = chunk_tx.send(Vec::new());
    });

    let header = reader.header()?;
    info!(
        "version: {}, generator: {}",
        header.get("version").unwrap_or("?"),
        header.get("generator").unwrap_or("?")
    );
    if header.has_multiple_object_versions() {
        info!("input is a change file");
    }

    let mut stats = Stats::default();
    for buffer in &mut reader {
        let buffer = buffer?;
        stats.num_buffers += 1;
        for entity in buffer.entities() {
            match entity.kind() {
                ItemKind::Node => stats.num_nodes += 1,
                ItemKind::Way => stats.num_ways += 1,
                ItemKind::Relation => stats.num_relations += 1,
                ItemKind::Changeset => stats.num_changesets += 1,
            }
            stats.num_tags += entity.tags().count();
        }
    }
    reader.join();
    feeder.join().expect("feeder thread panicked");

    println!("{stats}");
    Ok(())
}

fn main() {
    let args = args::Args::parse();
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_module_path(false)
        .format_timestamp_nanos()
        .init();

    if let Err(e) = run(args) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}
