pub mod context;
pub mod extract;

use crate::db::{Database, Params};
use crate::fees::mempoolspace::RecommendedFees;
use crate::fees::whatthefee::FeerateEstimation;
use log::{debug, warn};
use std::collections::BTreeMap;

/// Outcome counters for one evaluation run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub evaluated: usize,
    pub updated: usize,
    pub script_failures: usize,
    pub store_failures: usize,
}

/// Evaluate every token's policy script against the current fee snapshots
/// and merge the resulting parameter updates into the store.
///
/// One evaluation per stored (token, validity) pair, strictly sequential.
/// Failures scoped to a single pair (script error, store update error) are
/// logged and skipped; every remaining pair is still processed.
pub fn run(
    db: &Database,
    all_params: &BTreeMap<String, Params>,
    mempool_fees: &RecommendedFees,
    curve_fees: &FeerateEstimation,
    max_script_ops: u64,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for (token, params) in all_params {
        if params.script.is_empty() {
            debug!("token {}: no policy script, skipping", token);
            continue;
        }

        for (&validity, opening_params) in &params.opening_params {
            summary.evaluated += 1;

            let ctx = context::ExecutionContext {
                token,
                validity,
                token_extra_data: params.extra_data.as_ref(),
                opening_params,
                mempool_fees,
                curve_fees,
            };

            let result = match context::execute(&ctx, &params.script, max_script_ops) {
                Ok(result) => result,
                Err(e) => {
                    warn!("token {} validity {}: script failed: {}", token, validity, e);
                    summary.script_failures += 1;
                    continue;
                }
            };

            let update = extract::candidate_update(result.as_ref());
            if update.is_empty() {
                debug!(
                    "token {} validity {}: script produced no usable fields",
                    token, validity
                );
            }

            match db.merge_update(token, validity, &update) {
                Ok(()) => {
                    if !update.is_empty() {
                        summary.updated += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        "token {} validity {}: store update failed: {:#}",
                        token, validity, e
                    );
                    summary.store_failures += 1;
                }
            }
        }
    }

    summary
}
