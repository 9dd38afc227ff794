use envelo_core::{BoundaryCatalog, BoundaryEvaluation, Parameters, parse_boundary_payload};
use serde_json::{Value, json};

use crate::util::{EXIT_CLIENT, EXIT_OK, emit, exit_error, parse_params, read_json_from_file};

/// Evaluate parameters against a local boundaries file. Nothing is recorded.
pub fn run(boundaries_file: &str, params: &[String]) -> i32 {
    let params = parse_params(params).unwrap_or_else(|e| {
        exit_error(&e, Some("Pass parameters as -p velocity_max=12.5"))
    });
    let payload = read_json_from_file(boundaries_file).unwrap_or_else(|e| exit_error(&e, None));
    let catalog = parse_boundary_payload(&payload)
        .and_then(BoundaryCatalog::new)
        .unwrap_or_else(|e| {
            exit_error(
                &format!("Invalid boundaries in '{boundaries_file}': {e}"),
                Some("Expected {\"boundaries\": [{\"name\": ..., \"min\": ..., \"max\": ...}]}"),
            )
        });

    let (report, blocked) = evaluate(&catalog, &params);
    emit(&report, if blocked { EXIT_CLIENT } else { EXIT_OK })
}

fn evaluate(catalog: &BoundaryCatalog, params: &Parameters) -> (Value, bool) {
    let evaluations: Vec<BoundaryEvaluation> = params
        .iter()
        .map(|(name, &value)| {
            let outcome = catalog.check(name, value);
            BoundaryEvaluation {
                boundary: name.clone(),
                value,
                passed: outcome.passed,
                message: outcome.message,
            }
        })
        .collect();
    let blocked = evaluations.iter().any(|e| !e.passed);
    let report = json!({
        "decision": if blocked { "blocked" } else { "allowed" },
        "evaluations": evaluations,
    });
    (report, blocked)
}
