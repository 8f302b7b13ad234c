use std::fs;
use std::sync::Arc;

use relu_cegar::storage::CounterMetrics;
use relu_cegar::{
    run_cegar, CaseSplitSolver, CegarConfig, CegarError, CegarOutcome, DenseNetwork, Network,
    Property,
};

const TENT: &str = r#"{
    "inputs": [{"min": 0.0, "max": 1.0}],
    "layers": [
        {"weights": [[1.0], [-1.0]], "biases": [0.0, 1.0]},
        {"weights": [[1.0, 1.0]], "biases": [0.0]}
    ]
}"#;

fn tent() -> DenseNetwork {
    DenseNetwork::from_json(TENT).unwrap()
}

#[test]
fn config_file_drives_a_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("solver.jsonl");
    let config_path = dir.path().join("cegar.toml");
    fs::write(
        &config_path,
        format!(
            "[solver]\ntimeout_ms = 60000\nlog_path = {:?}\n\n[refinement]\nmax_refinements = 8\n",
            log.display().to_string()
        ),
    )
    .unwrap();

    let config = CegarConfig::load(&config_path).unwrap();
    let metrics = Arc::new(CounterMetrics::default());
    let options = config.network_options().metrics(metrics.clone());
    let property = Property::OutputAtLeast {
        output: 0,
        threshold: 1.5,
    };
    let mut network = Network::build(&tent(), property, options).unwrap();
    let report = run_cegar(&mut network, &mut CaseSplitSolver::new(), &config).unwrap();

    assert_eq!(report.outcome, CegarOutcome::Unsat);
    assert_eq!(report.merges, 1);
    assert_eq!(report.refinements, 1);
    let records = fs::read_to_string(&log).unwrap();
    assert_eq!(records.lines().count(), report.solver_calls);
    let metrics_calls = metrics.abstract_solves.load(std::sync::atomic::Ordering::Relaxed)
        + metrics.concrete_solves.load(std::sync::atomic::Ordering::Relaxed);
    assert_eq!(metrics_calls as usize, report.solver_calls);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"]["outcome"], "unsat");
    assert_eq!(json["refinements"], 1);
}

#[test]
fn sat_report_carries_the_witness() {
    let property = Property::OutputAtMost {
        output: 0,
        threshold: 1.0,
    };
    let config = CegarConfig::default();
    let mut network = Network::build(&tent(), property, config.network_options()).unwrap();
    let report = run_cegar(&mut network, &mut CaseSplitSolver::new(), &config).unwrap();
    let CegarOutcome::Sat { counterexample } = &report.outcome else {
        panic!("expected SAT, got {:?}", report.outcome);
    };
    let outputs = tent().evaluate(&counterexample.inputs).unwrap();
    assert!((outputs[0] - 1.0).abs() < 1e-6);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"]["outcome"], "sat");
    assert_eq!(json["outcome"]["counterexample"]["inputs"].as_array().unwrap().len(), 1);
}

#[test]
fn malformed_inputs_are_reported() {
    assert!(matches!(
        CegarConfig::from_toml_str("[refinement]\nmax_splits = 2\n"),
        Err(CegarError::Config(_))
    ));
    assert!(matches!(
        CegarConfig::load("/nonexistent/cegar.toml"),
        Err(CegarError::Io(_))
    ));
    assert!(matches!(
        DenseNetwork::from_json(r#"{"inputs": [{"min": 2.0, "max": 1.0}], "layers": [{"weights": [[1.0]], "biases": [0.0]}]}"#),
        Err(CegarError::InvalidArgument(_))
    ));
}
