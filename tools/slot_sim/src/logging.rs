use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use log::{LevelFilter, Log, Metadata, Record};
use serde_json::{json, Value};

use crate::runner::StepOutcome;

/// Console output mirrored to an optional JSON-lines file.
pub struct Logger {
    json_file: Option<File>,
    scenario: String,
}

impl Logger {
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("SLOT_SIM_LOG_JSON_PATH").ok();
        Self::new(path.map(PathBuf::from))
    }

    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let json_file = match path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("failed opening log file {}", path.display()))?;
                Some(file)
            }
            None => None,
        };
        Ok(Self {
            json_file,
            scenario: String::new(),
        })
    }

    pub fn set_scenario(&mut self, name: &str) {
        self.scenario = name.to_string();
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        println!("{}", message.as_ref());
        self.message("info", message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        eprintln!("{}", message.as_ref());
        self.message("warn", message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        eprintln!("{}", message.as_ref());
        self.message("error", message.as_ref());
    }

    pub fn step(&mut self, outcome: &StepOutcome) {
        let verdict = if outcome.matched() { "ok" } else { "MISMATCH" };
        println!(
            "  [{:>3}] {:<14} {:<8} {}",
            outcome.index, outcome.op, verdict, outcome.detail
        );
        let entry = json!({
            "level": if outcome.matched() { "info" } else { "warn" },
            "step": outcome.index,
            "op": outcome.op,
            "ok": outcome.ok,
            "expected": outcome.expected,
            "detail": outcome.detail,
        });
        self.write(entry);
    }

    fn message(&mut self, level: &str, message: &str) {
        self.write(json!({
            "level": level,
            "msg": message,
        }));
    }

    fn write(&mut self, mut entry: Value) {
        let Some(file) = &mut self.json_file else {
            return;
        };

        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        if let Some(fields) = entry.as_object_mut() {
            fields.insert("ts_ms".into(), json!(ts_ms));
            fields.insert("scenario".into(), json!(self.scenario));
        }

        let _ = writeln!(file, "{}", entry);
        let _ = file.flush();
    }
}

/// Routes the driver's `log` records to stderr.
struct DriverLog;

static DRIVER_LOG: DriverLog = DriverLog;

impl Log for DriverLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the driver log sink; later calls only adjust the level.
pub fn init_driver_log(level: LevelFilter) {
    let _ = log::set_logger(&DRIVER_LOG);
    log::set_max_level(level);
}
