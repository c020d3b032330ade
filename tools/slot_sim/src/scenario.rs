//! TOML description of a simulated card and the operations run against it.
//!
//! ```toml
//! name = "sdhc round trip"
//!
//! [card]
//! status = 0x110001
//! sectors = 128
//!
//! [[step]]
//! op = "start"
//! expect = true
//!
//! [[step]]
//! op = "write"
//! sector = 4
//! count = 2
//! fill = 0xAB
//! ```

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Largest transfer a single step may request.
pub const MAX_TRANSFER_SECTORS: u32 = 64;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub card: CardSetup,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardSetup {
    /// Raw controller status word.
    pub status: u32,
    #[serde(default = "default_sectors")]
    pub sectors: usize,
    #[serde(default)]
    pub rca: Option<u16>,
    #[serde(default)]
    pub reset_polls: u32,
    #[serde(default)]
    pub initialize_after_reset: bool,
    /// Device path the simulated service answers on.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_sectors() -> usize {
    256
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Start {
        expect: Option<bool>,
    },
    Stop {
        expect: Option<bool>,
    },
    Inserted {
        expect: Option<bool>,
    },
    Write {
        sector: u32,
        count: u32,
        fill: u8,
        #[serde(default)]
        misalign: bool,
        expect: Option<bool>,
    },
    Read {
        sector: u32,
        count: u32,
        expect_fill: Option<u8>,
        #[serde(default)]
        misalign: bool,
        expect: Option<bool>,
    },
    FailCommand {
        cmd: u8,
        code: i32,
    },
    ClearFailures,
    SetStatus {
        status: u32,
    },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Inserted { .. } => "inserted",
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::FailCommand { .. } => "fail_command",
            Self::ClearFailures => "clear_failures",
            Self::SetStatus { .. } => "set_status",
        }
    }
}

impl Scenario {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    fn validate(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            let count = match step {
                Step::Write { count, .. } | Step::Read { count, .. } => *count,
                _ => continue,
            };
            if count > MAX_TRANSFER_SECTORS {
                bail!(
                    "step {index} ({}) moves {count} sectors, limit is {MAX_TRANSFER_SECTORS}",
                    step.op()
                );
            }
        }
        Ok(())
    }
}

pub fn parse_scenario(raw: &str) -> Result<Scenario> {
    let scenario: Scenario = toml::from_str(raw).context("invalid scenario")?;
    scenario.validate()?;
    Ok(scenario)
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading scenario file {}", path.display()))?;
    parse_scenario(&raw).with_context(|| format!("failed parsing scenario file {}", path.display()))
}
