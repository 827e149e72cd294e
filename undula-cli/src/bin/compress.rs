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

use undula_codec_speck::chunk::qz_level_for_tolerance;
use undula_codec_speck::volume::VolumeCompressor;
use undula_codec_speck::RateMode;
use undula_core::errors::Error;

/// Compress a raw floating-point volume into an Undula stream.
#[derive(Parser)]
#[command(name = "undula-compress", version)]
struct Args {
    /// Input file of raw little-endian samples, X varying fastest.
    input: PathBuf,

    /// Volume dimensions: Nx Ny Nz. Use Nz=1 for 2-D data and Ny=Nz=1 for 1-D.
    #[arg(long, num_args = 3, required = true, value_names = ["NX", "NY", "NZ"])]
    dims: Vec<usize>,

    /// Chunk dimensions; defaults to the whole volume as one chunk.
    #[arg(long, num_args = 3, value_names = ["CX", "CY", "CZ"])]
    chunks: Option<Vec<usize>>,

    /// Target bit rate in bits per sample, in (0, 64].
    #[arg(long, conflicts_with = "pwe")]
    bpp: Option<f64>,

    /// Point-wise error tolerance; switches to quantization-terminated coding.
    #[arg(long)]
    pwe: Option<f64>,

    /// Treat the input as f64 samples instead of f32.
    #[arg(long = "f64")]
    input_f64: bool,

    /// Worker threads for chunk compression.
    #[arg(long)]
    threads: Option<usize>,

    /// Output path; defaults to the input path with an `.udl` suffix appended.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn run(args: &Args) -> Result<(), Error> {
    let dims = [args.dims[0], args.dims[1], args.dims[2]];
    let total_vals = dims[0] * dims[1] * dims[2];

    let mode = match (args.bpp, args.pwe) {
        (Some(bpp), None) => RateMode::BitsPerSample(bpp),
        (None, Some(tolerance)) => {
            RateMode::QzTermination { level: qz_level_for_tolerance(tolerance)?, tolerance }
        }
        _ => return Err(Error::InvalidParam("exactly one of --bpp or --pwe is required")),
    };

    let chunk_dims = match &args.chunks {
        Some(c) => [c[0], c[1], c[2]],
        None => dims,
    };

    let mut compressor = VolumeCompressor::new();
    compressor.set_mode(mode);
    if let Some(threads) = args.threads {
        compressor.set_num_threads(threads);
    }

    if args.input_f64 {
        let samples = undula_cli::read_raw_f64(&args.input)?;
        if samples.len() != total_vals {
            return Err(Error::WrongSize("file length does not match --dims"));
        }
        compressor.copy_data(&samples, dims, chunk_dims)?;
    }
    else {
        let samples = undula_cli::read_raw_f32(&args.input)?;
        if samples.len() != total_vals {
            return Err(Error::WrongSize("file length does not match --dims"));
        }
        compressor.copy_data(&samples, dims, chunk_dims)?;
    }

    compressor.compress()?;
    let frame = compressor.encoded_bitstream()?;

    let output = args.output.clone().unwrap_or_else(|| {
        let mut path = args.input.clone().into_os_string();
        path.push(".udl");
        PathBuf::from(path)
    });
    std::fs::write(&output, &frame)?;

    info!(
        "wrote {}: {} bytes, {:.3} bits per sample",
        output.display(),
        frame.len(),
        frame.len() as f64 * 8.0 / total_vals as f64
    );
    if let RateMode::QzTermination { .. } = mode {
        info!("encoded {} outliers", compressor.num_outliers());
    }

    Ok(())
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("undula-compress: {}", err);
            ExitCode::FAILURE
        }
    }
}
