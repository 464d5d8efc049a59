use crate::db::CandidateUpdate;
use rhai::{Dynamic, Map};

/// Pull the well-typed subset of fields out of a script's result object.
///
/// Fields that are absent or of the wrong type are dropped one by one; a
/// partially usable result still yields a partial update. `None` (the
/// script declared no result object) yields an empty update.
pub fn candidate_update(result: Option<&Map>) -> CandidateUpdate {
    let Some(map) = result else {
        return CandidateUpdate::default();
    };
    CandidateUpdate {
        min_msat: map.get("min_msat").and_then(as_u64),
        proportional: map.get("proportional").and_then(as_u32),
        extra_data: map.get("extra_data").and_then(as_json),
    }
}

fn as_u64(value: &Dynamic) -> Option<u64> {
    u64::try_from(value.as_int().ok()?).ok()
}

fn as_u32(value: &Dynamic) -> Option<u32> {
    u32::try_from(value.as_int().ok()?).ok()
}

/// Scripts hand extra data back as a JSON-encoded string.
fn as_json(value: &Dynamic) -> Option<serde_json::Value> {
    let text = value.clone().into_string().ok()?;
    serde_json::from_str(&text).ok()
}
