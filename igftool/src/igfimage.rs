// SPDX-License-Identifier: MIT

//! Inspect and build IGF flash images.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use igfio::prelude::*;
use igfpart::layout::{
    BOOTREG_SIZE, IGF_SECTION_SIZE, PTYPE_EMPTY, PTYPE_IGEL_COMPRESSED, PTYPE_IGEL_FREELIST,
    PTYPE_IGEL_RAW,
};
use igfpart::{Detected, SectionSource, assemble, detect_format, read_directory};

#[derive(Parser)]
#[command(name = "igfimage", version, about = "IGF flash image tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the partition directory of an image or device
    Info {
        /// Image file or block device
        device: PathBuf,
    },
    /// Guess the section-header format of a raw device
    Detect {
        /// Image file or block device
        device: PathBuf,
    },
    /// Build a fresh image from live partition section streams
    Build {
        /// Target device size in bytes
        #[arg(short = 's', long = "size", value_name = "bytes")]
        size: u64,

        /// Boot registry blob (exactly 32 KiB), copied verbatim
        #[arg(short = 'b', long = "bootreg", value_name = "file")]
        bootreg: PathBuf,

        /// Partition input as minor:file, repeatable, in output order
        #[arg(
            short = 'p',
            long = "partition",
            required = true,
            value_name = "minor:file",
            value_parser = parse_part
        )]
        partitions: Vec<(u16, PathBuf)>,

        /// Output image file
        #[arg(short = 'o', long = "output", value_name = "file")]
        output: PathBuf,
    },
}

/// clap value parser for `minor:file` partition arguments.
fn parse_part(s: &str) -> Result<(u16, PathBuf), String> {
    let (minor, path) = s
        .split_once(':')
        .ok_or_else(|| format!("`{s}` is not of the form minor:file"))?;
    let minor: u16 = minor
        .parse()
        .map_err(|_| format!("`{minor}` is not a partition minor"))?;
    if minor == 0 || minor > 255 {
        return Err(format!("minor {minor} out of range (1..=255)"));
    }
    Ok((minor, PathBuf::from(path)))
}

fn ptype_name(ptype: u16) -> &'static str {
    match ptype {
        PTYPE_EMPTY => "empty",
        PTYPE_IGEL_RAW => "raw",
        PTYPE_IGEL_COMPRESSED => "compressed",
        PTYPE_IGEL_FREELIST => "freelist",
        _ => "unknown",
    }
}

fn info(device: &PathBuf) -> anyhow::Result<ExitCode> {
    let mut file = File::open(device)
        .with_context(|| format!("could not open {}", device.display()))?;
    let mut io = StdFlashIO::new(&mut file);

    match detect_format(&mut io)? {
        Detected::Format(fmt) => println!("section format: {fmt}"),
        Detected::Unknown => println!("section format: {}", "unknown".yellow()),
    }

    let dir = read_directory(&mut io)
        .with_context(|| format!("no valid partition directory on {}", device.display()))?;

    println!(
        "directory: version {}, {}/{} fragment slots used",
        dir.version, dir.n_fragments, dir.max_fragments
    );
    println!(
        "{:>5} {:>10} {:>9} {:>9} {:>12}",
        "minor", "type", "frags", "sections", "bytes"
    );
    for minor in dir.present_minors() {
        let part = dir.partition(minor)?;
        let sections = dir.section_count(minor)?;
        println!(
            "{:>5} {:>10} {:>9} {:>9} {:>12}",
            minor,
            ptype_name(part.ptype),
            part.n_fragments,
            sections,
            sections * IGF_SECTION_SIZE as u64
        );
    }
    let freelist = dir.partition(0)?;
    if freelist.is_present() {
        let sections = dir.section_count(0)?;
        println!(
            "{:>5} {:>10} {:>9} {:>9} {:>12}",
            0, "freelist", freelist.n_fragments, sections, ""
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn detect(device: &PathBuf) -> anyhow::Result<ExitCode> {
    let mut file = File::open(device)
        .with_context(|| format!("could not open {}", device.display()))?;
    let mut io = StdFlashIO::new(&mut file);

    match detect_format(&mut io)? {
        Detected::Format(fmt) => {
            println!("{fmt}");
            Ok(ExitCode::SUCCESS)
        }
        Detected::Unknown => {
            println!("{}", "unknown".yellow());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn build(
    size: u64,
    bootreg_path: &PathBuf,
    partitions: &[(u16, PathBuf)],
    output: &PathBuf,
) -> anyhow::Result<ExitCode> {
    if size % IGF_SECTION_SIZE as u64 != 0 {
        bail!("device size must be a multiple of {} bytes", IGF_SECTION_SIZE);
    }

    let bootreg = std::fs::read(bootreg_path)
        .with_context(|| format!("could not read {}", bootreg_path.display()))?;
    if bootreg.len() != BOOTREG_SIZE {
        bail!(
            "{} is {} bytes, boot registry must be exactly {}",
            bootreg_path.display(),
            bootreg.len(),
            BOOTREG_SIZE
        );
    }

    let mut sources = Vec::with_capacity(partitions.len());
    for (minor, path) in partitions {
        let stream = File::open(path)
            .with_context(|| format!("could not open partition input {}", path.display()))?;
        sources.push(SectionSource::new(*minor, stream));
    }

    // Truncate on create: old output content must not survive.
    let mut out = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(output)
        .with_context(|| format!("could not open output file {}", output.display()))?;
    let mut out_io = StdFlashIO::new(&mut out);

    assemble(&mut out_io, size, &bootreg, &mut sources)
        .with_context(|| format!("could not assemble {}", output.display()))?;

    println!(
        "{} {} ({} partitions, {} bytes)",
        "wrote".green(),
        output.display(),
        partitions.len(),
        size
    );
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { device } => info(&device),
        Commands::Detect { device } => detect(&device),
        Commands::Build {
            size,
            bootreg,
            partitions,
            output,
        } => build(size, &bootreg, &partitions, &output),
    }
}
