//! Headless runner: steps a simulation and optionally writes PNG frames.
//!
//! ```text
//! physarum [--steps N] [--size WxH] [--agents N] [--seed N]
//!          [--params preset.json] [--output DIR] [--every N] [--gpu]
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for per-frame
//! output.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use physarum::prelude::*;
use physarum::present::save_png;

#[derive(Debug, PartialEq)]
struct RunnerArgs {
    steps: u32,
    width: u32,
    height: u32,
    agents: usize,
    seed: u64,
    params: Option<PathBuf>,
    output: Option<PathBuf>,
    every: u32,
    gpu: bool,
}

impl Default for RunnerArgs {
    fn default() -> Self {
        let config = SimulationConfig::default();
        Self {
            steps: 600,
            width: config.width,
            height: config.height,
            agents: config.population,
            seed: config.seed,
            params: None,
            output: None,
            every: 0,
            gpu: false,
        }
    }
}

const USAGE: &str = "Usage: physarum [--steps N] [--size WxH] [--agents N] [--seed N] \
[--params preset.json] [--output DIR] [--every N] [--gpu]";

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} needs a value", flag))?;
    value
        .parse()
        .map_err(|_| format!("{}: invalid value {:?}", flag, value))
}

fn parse_size(value: Option<String>) -> Result<(u32, u32), String> {
    let value = value.ok_or_else(|| "--size needs a value".to_string())?;
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("--size: expected WxH, got {:?}", value))?;
    let width = w.parse().map_err(|_| format!("--size: invalid width {:?}", w))?;
    let height = h.parse().map_err(|_| format!("--size: invalid height {:?}", h))?;
    Ok((width, height))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<RunnerArgs, String> {
    let mut parsed = RunnerArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--steps" => parsed.steps = parse_number(&arg, args.next())?,
            "--size" => (parsed.width, parsed.height) = parse_size(args.next())?,
            "--agents" => parsed.agents = parse_number(&arg, args.next())?,
            "--seed" => parsed.seed = parse_number(&arg, args.next())?,
            "--params" => {
                parsed.params = Some(args.next().ok_or("--params needs a path")?.into())
            }
            "--output" => {
                parsed.output = Some(args.next().ok_or("--output needs a path")?.into())
            }
            "--every" => parsed.every = parse_number(&arg, args.next())?,
            "--gpu" => parsed.gpu = true,
            other => return Err(format!("unknown argument {:?}", other)),
        }
    }
    Ok(parsed)
}

fn run<B: ComputeBackend>(
    mut sim: SimulationController<B>,
    args: &RunnerArgs,
) -> Result<(), SimulationError> {
    let mut exporter = match (&args.output, args.every) {
        (Some(dir), every) if every > 0 => Some(ImageExporter::new(dir).with_every(every)),
        _ => None,
    };

    let mut time = Time::new();
    for _ in 0..args.steps {
        sim.advance()?;
        if let Some(exporter) = exporter.as_mut() {
            sim.present(exporter)?;
        }
        if time.update() {
            log::info!("frame {}: {:.1} steps/s", sim.frame(), time.fps());
        }
    }

    let field = sim.read_field()?;
    log::info!(
        "finished {} steps in {:.2}s ({:.1} steps/s), trail total {:.3}, peak {:.3}",
        args.steps,
        time.elapsed(),
        time.average_fps(),
        field.sum(),
        field.max_value()
    );

    if let Some(output) = &args.output {
        let path = output.join("final.png");
        save_png(&field, Tonemap::Normalize, &path)?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    use env_logger::Env;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    let result = (|| -> Result<(), SimulationError> {
        let parameters = match &args.params {
            Some(path) => SimulationParameters::from_json(&fs::read_to_string(path)?)?,
            None => SimulationParameters::default(),
        };
        let config = SimulationConfig::new(args.agents, args.width, args.height)
            .with_parameters(parameters)
            .with_seed(args.seed);

        if args.gpu {
            let backend = WgpuBackend::new()?;
            run(SimulationController::initialize(backend, config)?, &args)
        } else {
            run(SimulationController::cpu(config)?, &args)
        }
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
