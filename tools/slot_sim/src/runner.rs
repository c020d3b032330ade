use anyhow::Result;
use sdio::sim::{SimCache, SimDelay, SimIndicator, SimIos};
use sdio::{CardPhase, DmaAligned, SdioConfig, SdioHost, SdioResult, DMA_ALIGN, SDIO_SECTOR_SIZE};
use sdslot::SdSlot;

use crate::logging::Logger;
use crate::scenario::{CardSetup, Scenario, Step, MAX_TRANSFER_SECTORS};

type SimSlot = SdSlot<SimIos, SimCache, SimDelay, SimIndicator>;

const BUFFER_LEN: usize = MAX_TRANSFER_SECTORS as usize * SDIO_SECTOR_SIZE + DMA_ALIGN;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    pub expected: Option<bool>,
    pub detail: String,
}

impl StepOutcome {
    pub fn matched(&self) -> bool {
        self.expected.is_none_or(|expected| expected == self.ok)
    }
}

#[derive(Debug)]
pub struct Report {
    pub name: String,
    pub outcomes: Vec<StepOutcome>,
    pub phase: CardPhase,
    pub ipc_calls: usize,
    pub indicator_raised: usize,
}

impl Report {
    pub fn mismatches(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.matched())
    }

    pub fn passed(&self) -> bool {
        self.mismatches().next().is_none()
    }
}

fn build_slot(card: &CardSetup) -> SimSlot {
    let mut ios = SimIos::new(card.status, card.sectors)
        .with_reset_polls(card.reset_polls)
        .initialize_after_reset(card.initialize_after_reset);
    if let Some(rca) = card.rca {
        ios = ios.with_rca(rca);
    }
    if let Some(path) = &card.path {
        ios = ios.with_path(path);
    }
    let host = SdioHost::new(
        ios,
        SimCache::default(),
        SimDelay::default(),
        SdioConfig::default(),
    );
    SdSlot::new(host, SimIndicator::default())
}

fn describe(result: SdioResult<()>) -> (bool, String) {
    match result {
        Ok(()) => (true, "ok".into()),
        Err(err) => (false, format!("{err} (code {})", err.code())),
    }
}

pub fn run_scenario(scenario: &Scenario, logger: &mut Logger) -> Result<Report> {
    logger.set_scenario(scenario.display_name());
    logger.info(format!(
        "scenario '{}': status={:#08x} sectors={}",
        scenario.display_name(),
        scenario.card.status,
        scenario.card.sectors
    ));

    let mut slot = build_slot(&scenario.card);
    let mut buffer = Box::new(DmaAligned([0u8; BUFFER_LEN]));
    let mut outcomes = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = run_step(&mut slot, &mut buffer.0, index, step);
        logger.step(&outcome);
        outcomes.push(outcome);
    }

    let report = Report {
        name: scenario.display_name().to_string(),
        outcomes,
        phase: slot.host().phase(),
        ipc_calls: slot.host().ios().calls().len(),
        indicator_raised: slot.indicator().raised(),
    };
    logger.info(format!(
        "scenario '{}': {} steps, {} mismatches, phase={:?}, ipc calls={}, indicator raised={}",
        report.name,
        report.outcomes.len(),
        report.mismatches().count(),
        report.phase,
        report.ipc_calls,
        report.indicator_raised
    ));
    Ok(report)
}

fn run_step(slot: &mut SimSlot, buffer: &mut [u8], index: usize, step: &Step) -> StepOutcome {
    let (ok, expected, detail) = match step {
        Step::Start { expect } => {
            let (ok, detail) = describe(slot.start());
            (ok, *expect, detail)
        }
        Step::Stop { expect } => {
            let (ok, detail) = describe(slot.stop());
            (ok, *expect, detail)
        }
        Step::Inserted { expect } => match slot.is_inserted() {
            Ok(inserted) => (inserted, *expect, format!("inserted={inserted}")),
            Err(err) => (false, *expect, format!("{err}")),
        },
        Step::Write {
            sector,
            count,
            fill,
            misalign,
            expect,
        } => {
            let data = transfer_window(buffer, *count, *misalign);
            data.fill(*fill);
            let (ok, detail) = describe(slot.write_sectors(*sector, *count, data));
            (ok, *expect, detail)
        }
        Step::Read {
            sector,
            count,
            expect_fill,
            misalign,
            expect,
        } => {
            let data = transfer_window(buffer, *count, *misalign);
            data.fill(0);
            let (mut ok, mut detail) = describe(slot.read_sectors(*sector, *count, data));
            if let (true, Some(fill)) = (ok, expect_fill) {
                if let Some(offset) = data.iter().position(|byte| byte != fill) {
                    ok = false;
                    detail = format!("byte {offset} is {:#04x}, want {fill:#04x}", data[offset]);
                }
            }
            (ok, *expect, detail)
        }
        Step::FailCommand { cmd, code } => {
            slot.host_mut().ios_mut().fail_command(*cmd, *code);
            (true, None, format!("cmd {cmd:#04x} -> {code}"))
        }
        Step::ClearFailures => {
            slot.host_mut().ios_mut().clear_failures();
            (true, None, "cleared".into())
        }
        Step::SetStatus { status } => {
            slot.host_mut().ios_mut().set_status(*status);
            (true, None, format!("status={status:#08x}"))
        }
    };

    StepOutcome {
        index,
        op: step.op(),
        ok,
        expected,
        detail,
    }
}

// Offsetting by one byte breaks the 32-byte alignment of the backing buffer.
fn transfer_window(buffer: &mut [u8], count: u32, misalign: bool) -> &mut [u8] {
    let start = usize::from(misalign);
    let len = count as usize * SDIO_SECTOR_SIZE;
    &mut buffer[start..start + len]
}
