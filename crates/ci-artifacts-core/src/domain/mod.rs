pub mod constraint;
pub mod fingerprint;
pub mod manifest;
pub mod report;

pub use constraint::{
    MatchConstraint,
    TimeWindow,
};
pub use fingerprint::{
    encode_path_hashes,
    path_hashes,
};
pub use manifest::{
    DownloadManifest,
    MANIFEST_FILE,
};
pub use report::{
    error_report,
    CommandOutput,
    Report,
};
