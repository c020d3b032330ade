use std::{fs, path::PathBuf};

use anyhow::Result;
use sdio::CardPhase;
use serde_json::Value;
use tempfile::tempdir;

use crate::{
    logging::Logger,
    runner::run_scenario,
    scenario::{load_scenario, parse_scenario, Step},
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

#[test]
fn sdhc_fixture_passes() -> Result<()> {
    let scenario = load_scenario(&fixture("sdhc-roundtrip.toml"))?;
    let mut logger = Logger::new(None)?;
    let report = run_scenario(&scenario, &mut logger)?;
    assert!(report.passed(), "{:?}", report.mismatches().collect::<Vec<_>>());
    assert_eq!(report.phase, CardPhase::Closed);
    assert_eq!(report.indicator_raised, 1);
    Ok(())
}

#[test]
fn controller_reset_fixture_recovers_on_second_start() -> Result<()> {
    let scenario = load_scenario(&fixture("controller-reset.toml"))?;
    let mut logger = Logger::new(None)?;
    let report = run_scenario(&scenario, &mut logger)?;
    assert!(report.passed());
    assert_eq!(report.outcomes[0].detail, "controller reset, card not ready yet (code -1)");
    assert_eq!(report.phase, CardPhase::Ready);
    Ok(())
}

#[test]
fn unexpected_result_is_reported_as_mismatch() -> Result<()> {
    let scenario = parse_scenario(
        r#"
        [card]
        status = 0

        [[step]]
        op = "start"
        expect = true
        "#,
    )?;
    let mut logger = Logger::new(None)?;
    let report = run_scenario(&scenario, &mut logger)?;
    assert!(!report.passed());
    let mismatch: Vec<_> = report.mismatches().collect();
    assert_eq!(mismatch.len(), 1);
    assert_eq!(mismatch[0].op, "start");
    assert!(mismatch[0].detail.contains("no card inserted"));
    Ok(())
}

#[test]
fn steps_parse_with_defaults() -> Result<()> {
    let scenario = parse_scenario(
        r#"
        [card]
        status = 0x10001

        [[step]]
        op = "read"
        sector = 3
        count = 2

        [[step]]
        op = "clear_failures"
        "#,
    )?;
    assert_eq!(scenario.card.sectors, 256);
    assert_eq!(scenario.display_name(), "unnamed");
    assert_eq!(
        scenario.steps,
        vec![
            Step::Read {
                sector: 3,
                count: 2,
                expect_fill: None,
                misalign: false,
                expect: None,
            },
            Step::ClearFailures,
        ]
    );
    Ok(())
}

#[test]
fn oversized_transfer_is_rejected_at_load() {
    let err = parse_scenario(
        r#"
        [card]
        status = 0x10001

        [[step]]
        op = "write"
        sector = 0
        count = 65
        fill = 1
        "#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("limit is 64"));
}

#[test]
fn unknown_card_field_is_rejected() {
    assert!(parse_scenario("[card]\nstatus = 1\nspeed = 50\n").is_err());
}

#[test]
fn json_log_records_every_step() -> Result<()> {
    let dir = tempdir()?;
    let scenario_path = dir.path().join("mini.toml");
    fs::write(
        &scenario_path,
        r#"
        name = "mini"

        [card]
        status = 0x10001
        sectors = 8

        [[step]]
        op = "start"
        expect = true

        [[step]]
        op = "read"
        sector = 8
        count = 1
        expect = false
        "#,
    )?;
    let log_path = dir.path().join("logs/run.jsonl");

    let scenario = load_scenario(&scenario_path)?;
    let mut logger = Logger::new(Some(log_path.clone()))?;
    let report = run_scenario(&scenario, &mut logger)?;
    assert!(report.passed());

    let entries: Vec<Value> = fs::read_to_string(&log_path)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    let steps: Vec<&Value> = entries
        .iter()
        .filter(|entry| entry.get("step").is_some())
        .collect();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1]["op"], "read");
    assert_eq!(steps[1]["ok"], false);
    assert!(entries.iter().all(|entry| entry["scenario"] == "mini"));
    assert!(entries.iter().all(|entry| entry["ts_ms"].is_u64()));
    Ok(())
}

#[test]
fn missing_scenario_file_names_the_path() {
    let err = load_scenario(&fixture("does-not-exist.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("does-not-exist.toml"));
}
