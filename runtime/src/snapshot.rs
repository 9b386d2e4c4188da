//! Snapshot merge: overlay a partial JSON value onto a typed initial state.
//!
//! Snapshots are partial. A snapshot of `{"score": 100}` for a state whose
//! initial value is `{score: 0, level: 1}` must seed `{score: 100, level: 1}`:
//! fields present in the snapshot win, absent fields keep their initial
//! values. The merge works on `serde_json::Value` in two passes (encode the
//! initial state, overlay the snapshot keys, decode back), so it needs no
//! reflection and works for any serde type. States that do not encode as
//! objects (numbers, sequences, `None`) are replaced by the snapshot outright.
//!
//! Every failure is soft. If the initial state cannot be encoded, the
//! snapshot is malformed or is not an object for an object state, or the
//! merged value does not
//! decode back into the state type, the initial state is returned unchanged
//! and a warning is logged. A bad snapshot never fails a projection.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Merge `snapshot` onto `initial`.
///
/// Smart pointers (`Box`, `Arc`, ...) serialize transparently, so a state
/// held behind one is merged through it.
///
/// ```
/// use fabula_runtime::snapshot::merge_snapshot;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// struct Game { score: i64, level: u32 }
///
/// let merged = merge_snapshot(&Game { score: 0, level: 1 }, br#"{"score":100}"#);
/// assert_eq!(merged, Game { score: 100, level: 1 });
/// ```
pub fn merge_snapshot<S>(initial: &S, snapshot: &[u8]) -> S
where
    S: Serialize + DeserializeOwned + Clone,
{
    let mut base = match serde_json::to_value(initial) {
        Ok(base) => base,
        Err(error) => {
            tracing::warn!(%error, "Initial state is not serializable; snapshot ignored");
            return initial.clone();
        }
    };

    let overlay_value = match serde_json::from_slice::<Value>(snapshot) {
        Ok(overlay_value) if base.is_object() && !overlay_value.is_object() => {
            tracing::warn!("Snapshot is not a JSON object; snapshot ignored");
            return initial.clone();
        }
        Ok(overlay_value) => overlay_value,
        Err(error) => {
            tracing::warn!(%error, "Malformed snapshot; snapshot ignored");
            return initial.clone();
        }
    };

    overlay(&mut base, overlay_value);

    match serde_json::from_value(base) {
        Ok(merged) => merged,
        Err(error) => {
            tracing::warn!(%error, "Merged snapshot does not fit the state type; snapshot ignored");
            initial.clone()
        }
    }
}

/// Overlay `patch` onto `base`, recursing into objects present on both sides.
fn overlay(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_fields), Value::Object(patch_fields)) => {
            for (key, patch_value) in patch_fields {
                match base_fields.get_mut(&key) {
                    Some(base_value) => overlay(base_value, patch_value),
                    None => {
                        base_fields.insert(key, patch_value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
