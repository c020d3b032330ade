mod logging;
mod runner;
#[cfg(test)]
mod runner_tests;
mod scenario;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use logging::Logger;
use sdio::host::codec::SdioRequest;
use sdio::{CommandType, ResponseType};

#[derive(Debug, Parser)]
#[command(name = "slot_sim")]
#[command(about = "Drive the SD slot driver against a simulated IOS service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one or more TOML scenarios.
    Run(RunArgs),
    /// Print the wire encoding of a command request.
    Encode(EncodeArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(required = true)]
    scenarios: Vec<PathBuf>,
    /// Append JSON-lines records to this file.
    #[arg(long = "log-json")]
    log_json: Option<PathBuf>,
    /// Driver log level (off, error, warn, info, debug, trace).
    #[arg(long = "log-level", default_value = "warn")]
    log_level: LevelFilter,
}

#[derive(Debug, Args)]
struct EncodeArgs {
    #[arg(long, value_parser = parse_number)]
    cmd: u32,
    #[arg(long, value_enum, default_value_t = CmdClass::Ac)]
    class: CmdClass,
    #[arg(long, value_enum, default_value_t = RspClass::R1)]
    response: RspClass,
    #[arg(long, value_parser = parse_number, default_value = "0")]
    arg: u32,
    #[arg(long = "blocks", value_parser = parse_number, default_value = "0")]
    blk_cnt: u32,
    #[arg(long = "block-size", value_parser = parse_number, default_value = "0")]
    blk_size: u32,
    #[arg(long = "dma-addr", value_parser = parse_number)]
    dma_addr: Option<u32>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CmdClass {
    Bc,
    Bcr,
    Ac,
    Adtc,
}

impl From<CmdClass> for CommandType {
    fn from(value: CmdClass) -> Self {
        match value {
            CmdClass::Bc => Self::Bc,
            CmdClass::Bcr => Self::Bcr,
            CmdClass::Ac => Self::Ac,
            CmdClass::Adtc => Self::Adtc,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RspClass {
    None,
    R1,
    R1b,
    R2,
    R3,
    R4,
    R5,
    R6,
}

impl From<RspClass> for ResponseType {
    fn from(value: RspClass) -> Self {
        match value {
            RspClass::None => Self::None,
            RspClass::R1 => Self::R1,
            RspClass::R1b => Self::R1b,
            RspClass::R2 => Self::R2,
            RspClass::R3 => Self::R3,
            RspClass::R4 => Self::R4,
            RspClass::R5 => Self::R5,
            RspClass::R6 => Self::R6,
        }
    }
}

fn parse_number(raw: &str) -> Result<u32, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    };
    parsed.map_err(|err| format!("invalid number '{raw}': {err}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Encode(args) => {
            println!("{}", encode(&args));
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    logging::init_driver_log(args.log_level);
    let mut logger = match args.log_json {
        Some(path) => Logger::new(Some(path))?,
        None => Logger::from_env()?,
    };

    let mut failed = Vec::new();
    for path in &args.scenarios {
        let scenario = scenario::load_scenario(path)?;
        if scenario.steps.is_empty() {
            logger.warn(format!("{} has no steps", path.display()));
        }
        let report = runner::run_scenario(&scenario, &mut logger)
            .with_context(|| format!("scenario {} aborted", path.display()))?;
        if !report.passed() {
            logger.error(format!("scenario '{}' failed", report.name));
            failed.push(report.name);
        }
    }

    if !failed.is_empty() {
        bail!("{} scenario(s) failed: {}", failed.len(), failed.join(", "));
    }
    logger.info(format!("{} scenario(s) passed", args.scenarios.len()));
    Ok(())
}

fn encode(args: &EncodeArgs) -> String {
    let request = SdioRequest {
        cmd: args.cmd,
        cmd_type: args.class.into(),
        rsp_type: args.response.into(),
        arg: args.arg,
        blk_cnt: args.blk_cnt,
        blk_size: args.blk_size,
        dma_addr: args.dma_addr.unwrap_or(0),
        is_dma: args.dma_addr.is_some(),
    };
    request
        .encode()
        .chunks(4)
        .map(|word| {
            word.iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
