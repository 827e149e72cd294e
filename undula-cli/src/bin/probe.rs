// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use undula_codec_speck::chunk::qz_level_for_tolerance;
use undula_codec_speck::volume::{VolumeCompressor, VolumeDecompressor};
use undula_codec_speck::RateMode;
use undula_core::errors::Error;

/// Interactively explore the rate-distortion behaviour of a volume.
///
/// Reads commands from standard input, one per line:
///   bpp <rate>      compress at a fixed bit rate
///   pwe <tol>       compress with an absolute point-wise error tolerance
///   rel <pct>       like pwe, with the tolerance given as a percentage of the data range
///   quit            exit (as does end of input or an empty line)
#[derive(Parser)]
#[command(name = "undula-probe", version)]
struct Args {
    /// Input file of raw little-endian samples, X varying fastest.
    input: PathBuf,

    /// Volume dimensions: Nx Ny Nz.
    #[arg(long, num_args = 3, required = true, value_names = ["NX", "NY", "NZ"])]
    dims: Vec<usize>,

    /// Treat the input as f64 samples instead of f32.
    #[arg(long = "f64")]
    input_f64: bool,
}

fn parse_command(line: &str, range: f64) -> Result<RateMode, Error> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or("");
    let value: f64 = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or(Error::InvalidParam("expected a numeric argument"))?;

    match verb {
        "bpp" => Ok(RateMode::BitsPerSample(value)),
        "pwe" => {
            Ok(RateMode::QzTermination { level: qz_level_for_tolerance(value)?, tolerance: value })
        }
        "rel" => {
            // A relative tolerance is a percentage of the data range; reject nonsense before
            // it turns into a zero or enormous absolute tolerance downstream.
            if value <= 0.0 || value >= 100.0 {
                return Err(Error::InvalidParam("relative tolerance must be in (0, 100)"));
            }
            let tolerance = value / 100.0 * range;
            Ok(RateMode::QzTermination { level: qz_level_for_tolerance(tolerance)?, tolerance })
        }
        _ => Err(Error::InvalidParam("unknown command; use bpp, pwe, or rel")),
    }
}

fn probe_once(samples: &[f64], dims: [usize; 3], mode: RateMode) -> Result<(), Error> {
    let mut compressor = VolumeCompressor::new();
    compressor.set_mode(mode);
    compressor.copy_data(samples, dims, dims)?;
    compressor.compress()?;
    let frame = compressor.encoded_bitstream()?;

    let mut decompressor = VolumeDecompressor::new();
    decompressor.use_bitstream(&frame)?;
    decompressor.decompress()?;

    let stats = undula_cli::compare(samples, decompressor.view_output());
    let bpp = frame.len() as f64 * 8.0 / samples.len() as f64;
    println!(
        "  {:.4} bits/sample, psnr {:.2} dB, rmse {:.3e}, max err {:.3e}",
        bpp, stats.psnr, stats.rmse, stats.max_err
    );
    if let RateMode::QzTermination { .. } = mode {
        println!("  {} outliers encoded", compressor.num_outliers());
    }

    Ok(())
}

fn run(args: &Args) -> Result<(), Error> {
    let dims = [args.dims[0], args.dims[1], args.dims[2]];
    let total_vals = dims[0] * dims[1] * dims[2];

    let samples: Vec<f64> = if args.input_f64 {
        undula_cli::read_raw_f64(&args.input)?
    }
    else {
        undula_cli::read_raw_f32(&args.input)?.into_iter().map(f64::from).collect()
    };
    if samples.len() != total_vals {
        return Err(Error::WrongSize("file length does not match --dims"));
    }

    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let range = max - min;
    println!("{} samples, range [{}, {}]", total_vals, min, max);

    let stdin = io::stdin();
    loop {
        print!("probe> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() || line == "quit" {
            break;
        }

        match parse_command(line, range) {
            Ok(mode) => {
                if let Err(err) = probe_once(&samples, dims, mode) {
                    println!("  error: {}", err);
                }
            }
            Err(err) => println!("  error: {}", err),
        }
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
            eprintln!("undula-probe: {}", err);
            ExitCode::FAILURE
        }
    }
}
