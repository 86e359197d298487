//! Change Detector
//!
//! Pure comparison of two snapshots of the same deployment. A missing field
//! is a distinct value, so a field appearing or disappearing is reported.
//! Values are compared strictly: no normalization, no debouncing.

use crate::models::{ChangeEvent, ChangeKind, ResourceState, COMPUTE_STATUS_FIELD, STATUS_FIELD};
use crate::utils::now_utc;

/// Fields watched for transitions, in emission order.
const WATCHED_FIELDS: &[(&str, ChangeKind)] = &[
    (STATUS_FIELD, ChangeKind::StatusChanged),
    (COMPUTE_STATUS_FIELD, ChangeKind::ComputeStatusChanged),
];

/// Compare `old` with `new` for `resource_id`.
///
/// Returns nothing when `old` is `None`: the first observation only
/// establishes the baseline. Status events always precede compute status
/// events.
pub fn detect(resource_id: &str, old: Option<&ResourceState>, new: &ResourceState) -> Vec<ChangeEvent> {
    let Some(old) = old else {
        return Vec::new();
    };

    let timestamp = now_utc();
    WATCHED_FIELDS
        .iter()
        .filter_map(|(field, kind)| {
            let before = old.get(field);
            let after = new.get(field);
            (before != after).then(|| ChangeEvent {
                kind: *kind,
                resource_id: resource_id.to_string(),
                old_value: before.cloned(),
                new_value: after.cloned(),
                timestamp: timestamp.clone(),
            })
        })
        .collect()
}
