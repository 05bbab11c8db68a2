use json_patch::Patch;
use k8s_openapi::api::core::v1::Pod;
use reef_common::errors::ReefServiceError;

/// Computes the JSON Patch that transforms `before` into `after`. The diff is
/// general; it is not told which fields the mutation touched, and the
/// operation order is a valid application order.
pub fn diff(before: &Pod, after: &Pod) -> Result<Patch, ReefServiceError> {
    let before = serde_json::to_value(before)
        .map_err(ReefServiceError::from_error("Unable to serialize Pod before mutation"))?;
    let after = serde_json::to_value(after)
        .map_err(ReefServiceError::from_error("Unable to serialize Pod after mutation"))?;
    Ok(json_patch::diff(&before, &after))
}
