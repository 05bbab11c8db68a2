use reef_common::errors::ReefServiceError;

/// Failures around the mutation itself. `BadRequest` means the review or the
/// embedded object could not be decoded; `Internal` means the engine produced
/// a Pod whose patch could not be computed or serialized.
#[derive(Debug)]
pub enum ReefPatchError {
    BadRequest(ReefServiceError),
    Internal(ReefServiceError),
}
