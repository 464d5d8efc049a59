use crate::db::OpeningParams;
use crate::fees::mempoolspace::RecommendedFees;
use crate::fees::whatthefee::FeerateEstimation;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Scope};

/// Read-only bundle bound into one script evaluation.
pub struct ExecutionContext<'a> {
    pub token: &'a str,
    pub validity: i64,
    pub token_extra_data: Option<&'a serde_json::Value>,
    pub opening_params: &'a OpeningParams,
    pub mempool_fees: &'a RecommendedFees,
    pub curve_fees: &'a FeerateEstimation,
}

/// Top-level binding a policy script declares to request an update.
pub const RESULT_BINDING: &str = "new_opening_params";

/// Run `script` in a fresh, sandboxed interpreter over the context bindings
/// and return the script's declared result object.
///
/// The script sees constants `token`, `validity`, `token_extra_data`,
/// `opening_params`, `mempoolspace_fees` and `whatthefee_fees`, plus
/// `json_encode`/`json_decode` for structured extra-data payloads. It is
/// expected to declare `let new_opening_params = #{ ... };` at top level;
/// an absent or non-map binding yields `None`, which callers treat as "no
/// update requested". Execution is bounded by `max_ops` interpreter
/// operations, so a runaway script fails like any other script error.
pub fn execute(
    ctx: &ExecutionContext,
    script: &str,
    max_ops: u64,
) -> Result<Option<Map>, Box<EvalAltResult>> {
    let engine = build_engine(max_ops);
    let mut scope = build_scope(ctx);
    engine.run_with_scope(&mut scope, script)?;
    Ok(scope.get_value::<Map>(RESULT_BINDING))
}

fn build_engine(max_ops: u64) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(max_ops);
    engine.register_fn("json_encode", json_encode);
    engine.register_fn("json_decode", json_decode);
    engine
}

fn build_scope(ctx: &ExecutionContext) -> Scope<'static> {
    let mut scope = Scope::new();
    scope.push_constant("token", ctx.token.to_string());
    scope.push_constant("validity", ctx.validity);
    scope.push_constant("token_extra_data", json_text(ctx.token_extra_data));
    scope.push_constant("opening_params", opening_params_map(ctx.opening_params));
    scope.push_constant("mempoolspace_fees", mempool_map(ctx.mempool_fees));
    scope.push_constant("whatthefee_fees", curve_map(ctx.curve_fees));
    scope
}

fn json_encode(value: Dynamic) -> Result<String, Box<EvalAltResult>> {
    serde_json::to_string(&value).map_err(|e| e.to_string().into())
}

fn json_decode(text: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    rhai::serde::to_dynamic(value)
}

/// Extra data is bound as its JSON text, empty string when unset.
fn json_text(value: Option<&serde_json::Value>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Unset numeric fields are bound as 0 so scripts can introspect prior
/// settings without guarding every access.
fn int_or_zero_u64(value: Option<u64>) -> i64 {
    value
        .map(|v| i64::try_from(v).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn int_or_zero_u32(value: Option<u32>) -> i64 {
    value.map(i64::from).unwrap_or(0)
}

fn opening_params_map(op: &OpeningParams) -> Map {
    let mut map = Map::new();
    map.insert("min_msat".into(), Dynamic::from(int_or_zero_u64(op.min_msat)));
    map.insert(
        "proportional".into(),
        Dynamic::from(int_or_zero_u32(op.proportional)),
    );
    map.insert(
        "max_idle_time".into(),
        Dynamic::from(int_or_zero_u32(op.max_idle_time)),
    );
    map.insert(
        "max_client_to_self_delay".into(),
        Dynamic::from(int_or_zero_u32(op.max_client_to_self_delay)),
    );
    map.insert(
        "extra_data".into(),
        Dynamic::from(json_text(op.extra_data.as_ref())),
    );
    map
}

fn mempool_map(fees: &RecommendedFees) -> Map {
    let mut map = Map::new();
    map.insert(
        "fastestFee".into(),
        Dynamic::from(fees.fastest_fee as i64),
    );
    map.insert(
        "halfHourFee".into(),
        Dynamic::from(fees.half_hour_fee as i64),
    );
    map.insert("hourFee".into(), Dynamic::from(fees.hour_fee as i64));
    map.insert("economyFee".into(), Dynamic::from(fees.economy_fee as i64));
    map.insert("minimumFee".into(), Dynamic::from(fees.minimum_fee as i64));
    map
}

fn curve_map(fees: &FeerateEstimation) -> Map {
    let index: Array = fees.index.iter().map(|&i| Dynamic::from(i)).collect();
    let columns: Array = fees
        .columns
        .iter()
        .map(|c| Dynamic::from(c.clone()))
        .collect();
    let data: Array = fees
        .data
        .iter()
        .map(|row| {
            let row: Array = row.iter().map(|&v| Dynamic::from(v)).collect();
            Dynamic::from(row)
        })
        .collect();

    let mut map = Map::new();
    map.insert("index".into(), Dynamic::from(index));
    map.insert("columns".into(), Dynamic::from(columns));
    map.insert("data".into(), Dynamic::from(data));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mempool() -> RecommendedFees {
        RecommendedFees {
            fastest_fee: 20,
            half_hour_fee: 15,
            hour_fee: 10,
            economy_fee: 5,
            minimum_fee: 1,
        }
    }

    fn sample_curve() -> FeerateEstimation {
        FeerateEstimation {
            index: vec![1, 2],
            columns: vec!["p10".to_string(), "p50".to_string()],
            data: vec![vec![5, 10], vec![8, 15]],
        }
    }

    fn sample_ctx<'a>(
        opening: &'a OpeningParams,
        mempool: &'a RecommendedFees,
        curve: &'a FeerateEstimation,
    ) -> ExecutionContext<'a> {
        ExecutionContext {
            token: "abc",
            validity: 144,
            token_extra_data: None,
            opening_params: opening,
            mempool_fees: mempool,
            curve_fees: curve,
        }
    }

    #[test]
    fn test_script_sees_all_bindings() {
        let opening = OpeningParams {
            min_msat: Some(5000),
            proportional: Some(1000),
            ..Default::default()
        };
        let mempool = sample_mempool();
        let curve = sample_curve();
        let ctx = sample_ctx(&opening, &mempool, &curve);

        let script = r#"
            let new_opening_params = #{
                min_msat: opening_params["min_msat"]
                    + mempoolspace_fees["fastestFee"]
                    + whatthefee_fees["data"][0][1]
                    + validity,
            };
        "#;
        let result = execute(&ctx, script, 100_000).unwrap().unwrap();
        // 5000 + 20 + 10 + 144
        assert_eq!(result["min_msat"].as_int().unwrap(), 5174);
    }

    #[test]
    fn test_unset_fields_bound_as_zero() {
        let opening = OpeningParams::default();
        let mempool = sample_mempool();
        let curve = sample_curve();
        let ctx = sample_ctx(&opening, &mempool, &curve);

        let script = r#"
            let new_opening_params = #{
                min_msat: opening_params["min_msat"],
                proportional: opening_params["proportional"],
            };
        "#;
        let result = execute(&ctx, script, 100_000).unwrap().unwrap();
        assert_eq!(result["min_msat"].as_int().unwrap(), 0);
        assert_eq!(result["proportional"].as_int().unwrap(), 0);
    }

    #[test]
    fn test_missing_result_binding_is_none() {
        let opening = OpeningParams::default();
        let mempool = sample_mempool();
        let curve = sample_curve();
        let ctx = sample_ctx(&opening, &mempool, &curve);

        let result = execute(&ctx, "let x = 1;", 100_000).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_non_map_result_binding_is_none() {
        let opening = OpeningParams::default();
        let mempool = sample_mempool();
        let curve = sample_curve();
        let ctx = sample_ctx(&opening, &mempool, &curve);

        let result = execute(&ctx, "let new_opening_params = 42;", 100_000).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_syntax_error_fails() {
        let opening = OpeningParams::default();
        let mempool = sample_mempool();
        let curve = sample_curve();
        let ctx = sample_ctx(&opening, &mempool, &curve);

        assert!(execute(&ctx, "let = ;", 100_000).is_err());
    }

    #[test]
    fn test_undefined_variable_fails() {
        let opening = OpeningParams::default();
        let mempool = sample_mempool();
        let curve = sample_curve();
        let ctx = sample_ctx(&opening, &mempool, &curve);

        assert!(execute(&ctx, "let new_opening_params = #{ min_msat: nosuch };", 100_000).is_err());
    }

    #[test]
    fn test_operation_budget_stops_runaway_script() {
        let opening = OpeningParams::default();
        let mempool = sample_mempool();
        let curve = sample_curve();
        let ctx = sample_ctx(&opening, &mempool, &curve);

        let result = execute(&ctx, "loop { }", 1_000);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_round_trip_through_script() {
        let opening = OpeningParams::default();
        let mempool = sample_mempool();
        let curve = sample_curve();
        let extra = serde_json::json!({"budget": 21000});
        let mut ctx = sample_ctx(&opening, &mempool, &curve);
        ctx.token_extra_data = Some(&extra);

        let script = r#"
            let decoded = json_decode(token_extra_data);
            let new_opening_params = #{
                min_msat: decoded["budget"],
                extra_data: json_encode(#{ budget: decoded["budget"] * 2 }),
            };
        "#;
        let result = execute(&ctx, script, 100_000).unwrap().unwrap();
        assert_eq!(result["min_msat"].as_int().unwrap(), 21000);
        let encoded = result["extra_data"].clone().into_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, serde_json::json!({"budget": 42000}));
    }
}
