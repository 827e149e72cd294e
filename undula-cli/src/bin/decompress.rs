// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use undula_codec_speck::stream::progressive_portion;
use undula_codec_speck::volume::VolumeDecompressor;
use undula_core::errors::Error;

/// Decompress an Undula stream back to raw floating-point samples.
#[derive(Parser)]
#[command(name = "undula-decompress", version)]
struct Args {
    /// Input Undula stream.
    input: PathBuf,

    /// Write f64 samples regardless of what the stream was compressed from.
    #[arg(long = "f64", conflicts_with = "output_f32")]
    output_f64: bool,

    /// Write f32 samples regardless of what the stream was compressed from.
    #[arg(long = "f32")]
    output_f32: bool,

    /// Decode only this percentage of each chunk's bytes (progressive decode).
    #[arg(long, value_name = "PCT")]
    portion: Option<u32>,

    /// Cap the decoded rate of a fixed-rate stream, in bits per sample.
    #[arg(long)]
    bpp: Option<f64>,

    /// Worker threads for chunk decompression.
    #[arg(long)]
    threads: Option<usize>,

    /// Output path; defaults to the input path with a `.raw` suffix appended.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn run(args: &Args) -> Result<(), Error> {
    let mut frame = std::fs::read(&args.input)?;
    if let Some(pct) = args.portion {
        frame = progressive_portion(&frame, pct)?;
    }

    let mut decompressor = VolumeDecompressor::new();
    if let Some(threads) = args.threads {
        decompressor.set_num_threads(threads);
    }
    decompressor.set_decode_bpp(args.bpp);
    decompressor.use_bitstream(&frame)?;

    let was_float = decompressor.info().map(|i| i.is_float).unwrap_or(false);
    let dims = decompressor.dims();
    decompressor.decompress()?;

    let output = args.output.clone().unwrap_or_else(|| {
        let mut path = args.input.clone().into_os_string();
        path.push(".raw");
        PathBuf::from(path)
    });

    // Default to the sample type the stream was compressed from.
    let write_f64 = args.output_f64 || (!args.output_f32 && !was_float);
    if write_f64 {
        undula_cli::write_raw_f64(&output, decompressor.view_output())?;
    }
    else {
        undula_cli::write_raw_f32(&output, &decompressor.output_as::<f32>())?;
    }

    info!(
        "wrote {}: {}x{}x{} samples as {}",
        output.display(),
        dims[0],
        dims[1],
        dims[2],
        if write_f64 { "f64" } else { "f32" }
    );

    Ok(())
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("undula-decompress: {}", err);
            ExitCode::FAILURE
        }
    }
}
