use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;
use vaultcore::config::Config;
use vaultcore::scenario::{self, Scenario, ScenarioError, StepValue};
use vaultcore::{AccountingExport, InvestableId, VaultError};

const THREE_WAY: &str = r#"{
    "assets": [{"asset": "USDC", "low": "1", "high": "1"}],
    "balances": [
        {"holder": "alice", "asset": "USDC", "amount": 20000},
        {"holder": "bob", "asset": "USDC", "amount": 5000}
    ],
    "investables": [
        {"leaf": {"id": "lend", "deposit_asset": "USDC"}},
        {"leaf": {"id": "lp", "deposit_asset": "USDC", "position": {"withdraw_slippage": 1000}}},
        {"leaf": {"id": "basis", "deposit_asset": "USDC", "position": {"borrow_ratio": 50000}}},
        {"portfolio": {
            "id": "fund",
            "deposit_asset": "USDC",
            "children": [
                {"investable": "lend", "allocation": 100000},
                {"investable": "lp", "allocation": 0},
                {"investable": "basis", "allocation": 0}
            ]
        }}
    ],
    "steps": [
        {"deposit": {"investable": "fund", "caller": "alice", "amount": 10000}},
        {"set_target_allocations": {"investable": "fund", "allocations": [33000, 33000, 34000]}},
        {"rebalance": {"investable": "fund"}},
        {"accrue_yield": {"investable": "lend", "amount": 330}},
        {"deposit": {"investable": "fund", "caller": "bob", "amount": 5000, "receiver": "carol"}},
        {"set_target_allocations": {"investable": "fund", "allocations": [50000, 50000]}},
        {"remove_investable": {"investable": "fund", "child": "lp", "allocations": [50000, 50000]}},
        {"withdraw": {"investable": "fund", "caller": "carol", "shares": 1000}}
    ]
}"#;

fn write_scenario(raw: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(raw.as_bytes()).unwrap();
    file
}

#[test]
fn test_scenario_file_replays() {
    let file = write_scenario(THREE_WAY);
    let scenario = Scenario::load(file.path()).unwrap();
    let report = scenario::run(&scenario, &Config::default()).unwrap();

    let oks: Vec<bool> = report.outcomes.iter().map(|o| o.ok).collect();
    assert_eq!(oks, vec![true, true, true, true, true, false, false, true]);
    assert_eq!(
        report.outcomes[2].value,
        Some(StepValue::Deltas(vec![-6_700, 3_300, 3_400]))
    );
    assert!(report.outcomes[5]
        .error
        .as_deref()
        .unwrap()
        .contains("allocations length"));
    assert!(report.outcomes[6]
        .error
        .as_deref()
        .unwrap()
        .contains("non-zero target allocation"));

    let fund = report
        .summaries
        .iter()
        .find(|s| s.investable == InvestableId::new("fund"))
        .unwrap();
    assert!(fund.portfolio);
    assert!(fund.share_supply > 0);
    assert!(fund.equity_low <= fund.equity_high);
}

#[test]
fn test_config_defaults_apply_to_scenario_vaults() {
    let mut env_map = HashMap::new();
    env_map.insert("VAULT_DEPOSIT_FEE".to_string(), "1000".to_string());
    env_map.insert("VAULT_FEE_RECEIVER".to_string(), "dao".to_string());
    let config = Config::from_env_map(env_map).unwrap();

    let raw = r#"{
        "assets": [{"asset": "USDC", "low": "1"}],
        "balances": [{"holder": "alice", "asset": "USDC", "amount": 1000}],
        "investables": [
            {"leaf": {"id": "a", "deposit_asset": "USDC"}},
            {"leaf": {"id": "b", "deposit_asset": "USDC", "fees": {"deposit": 0}}}
        ],
        "steps": [
            {"deposit": {"investable": "a", "caller": "alice", "amount": 500}},
            {"deposit": {"investable": "b", "caller": "alice", "amount": 500}},
            {"claim_fee": {"investable": "a"}}
        ]
    }"#;
    let report = scenario::run(&Scenario::from_json(raw).unwrap(), &config).unwrap();
    let values: Vec<_> = report.outcomes.iter().map(|o| o.value.clone()).collect();
    assert_eq!(
        values,
        vec![
            Some(StepValue::Amount(495)),
            Some(StepValue::Amount(500)),
            Some(StepValue::Amount(5)),
        ]
    );
}

#[test]
fn test_harvest_and_price_steps() {
    let raw = r#"{
        "assets": [{"asset": "USDC", "low": "1"}],
        "balances": [{"holder": "alice", "asset": "USDC", "amount": 1000}],
        "investables": [
            {"leaf": {"id": "a", "deposit_asset": "USDC", "fees": {"performance": 20000}}}
        ],
        "steps": [
            {"deposit": {"investable": "a", "caller": "alice", "amount": 1000}},
            {"add_rewards": {"investable": "a", "amount": 50}},
            {"harvest": {"investable": "a"}},
            {"set_price": {"asset": "USDC", "low": "0.5", "high": "2"}},
            {"pause": {"investable": "a"}},
            {"withdraw": {"investable": "a", "caller": "alice", "shares": 10}},
            {"unpause": {"investable": "a"}}
        ]
    }"#;
    let report = scenario::run(&Scenario::from_json(raw).unwrap(), &Config::default()).unwrap();
    assert_eq!(report.outcomes[2].value, Some(StepValue::Amount(50)));
    assert!(!report.outcomes[5].ok);

    let a = &report.summaries[0];
    assert_eq!(a.equity_low, 520);
    assert_eq!(a.equity_high, 2_080);
    assert_eq!(a.accumulated_fee, 10);
    assert!(!a.paused);
}

#[test]
fn test_report_fingerprint_matches_export_format() {
    let report = scenario::run(&Scenario::from_json(THREE_WAY).unwrap(), &Config::default())
        .unwrap();
    assert!(report.fingerprint.starts_with("sha256:"));
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"type\":\"deposit\""));
    let empty = AccountingExport::new(Vec::new()).unwrap();
    assert!(empty.fingerprint.starts_with("sha256:"));
}

#[test]
fn test_malformed_scenario_rejected() {
    let file = write_scenario("{\"investables\": [{\"vault\": {}}]}");
    assert!(matches!(
        Scenario::load(file.path()),
        Err(ScenarioError::Json(_))
    ));
    assert!(matches!(
        Scenario::load("/nonexistent/scenario.json"),
        Err(ScenarioError::Io(_))
    ));
}

#[test]
fn test_scenario_rejects_invalid_fee_override() {
    let raw = r#"{
        "investables": [
            {"leaf": {"id": "a", "deposit_asset": "USDC", "fees": {"withdrawal": 100000}}}
        ]
    }"#;
    let result = scenario::run(&Scenario::from_json(raw).unwrap(), &Config::default());
    assert!(matches!(
        result,
        Err(ScenarioError::Setup(VaultError::InvalidFeeError { fee: 100_000 }))
    ));
}
