pub mod render_manifest;
pub mod submit_run;

pub use render_manifest::{
    RenderManifestOperation, RenderManifestOperationRequest, RenderManifestOperationResult,
};
pub use submit_run::{
    RunMetadataRecord, SubmitRunOperation, SubmitRunOperationRequest, SubmitRunOperationResult,
    SubmittedRun, SubmittedRunStatus,
};
