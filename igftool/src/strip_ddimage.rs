// SPDX-License-Identifier: MIT

//! Deletes given partitions from an IGF ddimage, e.g.
//! `strip_ddimage -d 29 -i ddimage.bin -o ddimage.new`
//! generates `ddimage.new` without partition 29.

use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use igfio::prelude::*;
use igfpart::strip;
use log::info;

#[derive(Parser)]
#[command(
    name = "strip_ddimage",
    version,
    about = "Delete IGF partitions from a ddimage"
)]
struct Cli {
    /// The IGF partition minor which should be removed (repeatable)
    #[arg(
        short = 'd',
        long = "delete",
        required = true,
        value_name = "minor",
        value_parser = clap::value_parser!(u16).range(2..=255)
    )]
    delete: Vec<u16>,

    /// The input file to process
    #[arg(short = 'i', long = "infile", value_name = "file")]
    infile: PathBuf,

    /// The output file
    #[arg(short = 'o', long = "outfile", value_name = "file")]
    outfile: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut input = File::open(&cli.infile)
        .with_context(|| format!("could not open input file {}", cli.infile.display()))?;

    // Truncate on create: old output content must not survive.
    let mut output = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&cli.outfile)
        .with_context(|| format!("could not open output file {}", cli.outfile.display()))?;

    let mut in_io = StdFlashIO::new(&mut input);
    let mut out_io = StdFlashIO::new(&mut output);

    strip(&mut in_io, &mut out_io, &cli.delete)
        .with_context(|| format!("could not strip {}", cli.infile.display()))?;

    info!(
        "strip_ddimage: wrote {} without minor(s) {:?}",
        cli.outfile.display(),
        cli.delete
    );
    Ok(())
}
