use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Unknown SV id referenced in cluster {0}: {1}")]
    UnknownSvId(u32, u32),

    #[error("Duplicate SV id in cluster {0}: {1}")]
    DuplicateSvId(u32, u32),

    #[error("SV {0} of type {1} requires an end breakend")]
    MissingEndBreakend(u32, String),

    #[error("SV {0} refers to the end breakend of a single-ended variant")]
    SingleEndedReference(u32),

    #[error("Invalid orientation {1} on SV {0}, expected 1 or -1")]
    InvalidOrientation(u32, i8),

    #[error("Invalid junction copy number {1} on SV {0}")]
    InvalidJcn(u32, f64),

    #[error("Error parsing cluster file: {0}")]
    ParseError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
