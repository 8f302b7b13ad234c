use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use relu_cegar::network::{DenseLayer, InputRange};
use relu_cegar::{
    run_cegar, CaseSplitSolver, CegarConfig, CegarOutcome, DenseNetwork, Network, NetworkOptions,
    Property, Solver, SolveOptions, Verdict,
};

/// 2-2-1 network with positive weights on [0, 1]^2; the output ranges over
/// [0, 6].
fn two_two_one() -> DenseNetwork {
    DenseNetwork::new(
        vec![InputRange { min: 0.0, max: 1.0 }; 2],
        vec![
            DenseLayer {
                weights: vec![vec![1.0, 2.0], vec![2.0, 1.0]],
                biases: vec![0.0, 0.0],
            },
            DenseLayer {
                weights: vec![vec![1.0, 1.0]],
                biases: vec![0.0],
            },
        ],
    )
    .unwrap()
}

fn above(threshold: f64) -> Property {
    Property::OutputAtLeast {
        output: 0,
        threshold,
    }
}

#[test]
fn threshold_above_abstract_maximum_is_unsat_directly() {
    // fully merged: y = 2·relu(2·x1 + 2·x2) <= 8
    let mut network = Network::build(&two_two_one(), above(10.0), NetworkOptions::new()).unwrap();
    let report = run_cegar(&mut network, &mut CaseSplitSolver::new(), &CegarConfig::default()).unwrap();
    assert_eq!(report.outcome, CegarOutcome::Unsat);
    assert_eq!(report.merges, 1);
    assert_eq!(report.refinements, 0);
    assert_eq!(report.solver_calls, 1);
}

#[test]
fn threshold_between_concrete_and_abstract_maximum_needs_refinement() {
    let mut network = Network::build(&two_two_one(), above(7.0), NetworkOptions::new()).unwrap();
    let report = run_cegar(&mut network, &mut CaseSplitSolver::new(), &CegarConfig::default()).unwrap();
    assert_eq!(report.outcome, CegarOutcome::Unsat);
    assert_eq!(report.refinements, 1);
    assert_eq!(report.solver_calls, 3);
}

#[test]
fn threshold_below_true_minimum_is_a_real_counterexample() {
    let net = two_two_one();
    let mut network = Network::build(&net, above(-0.5), NetworkOptions::new()).unwrap();
    network.abstract_network().unwrap();
    while let Ok(candidate) = network.decide_merge() {
        network.apply_merge(&candidate).unwrap();
    }
    let verdict = network
        .check_sat_unsat_or_spurious(&mut CaseSplitSolver::new(), &SolveOptions::default())
        .unwrap();
    let Verdict::Sat(cex) = verdict else {
        panic!("expected SAT, got {verdict:?}");
    };

    // replaying the witness on the unabstracted query must stay SAT
    let mut pinned = network.concrete_query().clone();
    for (var, value) in cex.inputs.iter().enumerate() {
        pinned.set_lower_bound(relu_cegar::types::VarId(var as u64), *value);
        pinned.set_upper_bound(relu_cegar::types::VarId(var as u64), *value);
    }
    let replay = CaseSplitSolver::new()
        .solve(&pinned, &SolveOptions::default())
        .unwrap();
    assert!(replay.is_sat());
    assert!(pinned.is_satisfied_by(&replay.assignment));
    let outputs = net.evaluate(&cex.inputs).unwrap();
    assert!(outputs[0] >= -0.5);
}

fn random_network(rng: &mut ChaCha8Rng, widths: &[usize], range: InputRange) -> DenseNetwork {
    const WEIGHTS: [f64; 4] = [-2.0, -1.0, 1.0, 2.0];
    let layers = widths
        .windows(2)
        .map(|pair| DenseLayer {
            weights: (0..pair[1])
                .map(|_| (0..pair[0]).map(|_| WEIGHTS[rng.gen_range(0..4)]).collect())
                .collect(),
            biases: vec![0.0; pair[1]],
        })
        .collect();
    DenseNetwork::new(vec![range; widths[0]], layers).unwrap()
}

/// Whatever the loop answers must agree with the unabstracted network.
fn assert_agreement(seed: u64, range: InputRange) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let shapes: [&[usize]; 2] = [&[2, 3, 1], &[2, 3, 2, 1]];
    for round in 0..6 {
        let net = random_network(&mut rng, shapes[round % 2], range);
        for property in [
            above(-1.0),
            above(0.5),
            above(3.0),
            Property::OutputAtMost {
                output: 0,
                threshold: -0.5,
            },
        ] {
            let mut network = Network::build(&net, property, NetworkOptions::new()).unwrap();
            let report =
                run_cegar(&mut network, &mut CaseSplitSolver::new(), &CegarConfig::default())
                    .unwrap();
            let concrete = CaseSplitSolver::new()
                .solve(network.concrete_query(), &SolveOptions::default())
                .unwrap();
            match report.outcome {
                CegarOutcome::Unsat => {
                    assert!(!concrete.is_sat(), "round {round}: {property:?} unsound UNSAT")
                }
                CegarOutcome::Sat { counterexample } => {
                    assert!(concrete.is_sat());
                    let outputs = net.evaluate(&counterexample.inputs).unwrap();
                    assert!((outputs[0] - counterexample.outputs[0]).abs() < 1e-6);
                    assert!(property.is_reached_by(&outputs), "round {round}: {property:?}");
                }
                CegarOutcome::Inconclusive { reason } => {
                    panic!("round {round}: {property:?} inconclusive: {reason}")
                }
            }
        }
    }
}

#[test]
fn random_networks_agree_with_the_concrete_query() {
    assert_agreement(7, InputRange { min: 0.0, max: 1.0 });
}

#[test]
fn random_networks_with_signed_inputs_agree_with_the_concrete_query() {
    assert_agreement(11, InputRange { min: -1.0, max: 1.0 });
}

/// y = relu(-x) + relu(-2·x) reaches 3 at x = -1.
#[test]
fn negative_inputs_are_never_folded_away() {
    let net = DenseNetwork::new(
        vec![InputRange { min: -1.0, max: 1.0 }],
        vec![
            DenseLayer {
                weights: vec![vec![-1.0], vec![-2.0]],
                biases: vec![0.0, 0.0],
            },
            DenseLayer {
                weights: vec![vec![1.0, 1.0]],
                biases: vec![0.0],
            },
        ],
    )
    .unwrap();
    let mut network = Network::build(&net, above(2.5), NetworkOptions::new()).unwrap();
    let report = run_cegar(&mut network, &mut CaseSplitSolver::new(), &CegarConfig::default()).unwrap();
    let CegarOutcome::Sat { counterexample } = &report.outcome else {
        panic!("expected SAT, got {:?}", report.outcome);
    };
    assert!(net.evaluate(&counterexample.inputs).unwrap()[0] >= 2.5 - 1e-6);
}
