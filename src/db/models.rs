use serde::{Deserialize, Serialize};

/// Cached state for one uploaded document, keyed by its filename.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Record {
    pub filename: String,
    pub srs_json: Option<String>,
    pub raw_text: Option<String>,
    pub ts: i64,
    pub status: Option<String>,
    pub proposal_json: Option<String>,
    pub pdf_path: Option<String>,
}

/// Partial update merged into a Record by `RecordStore::upsert`. Unset
/// fields keep whatever the stored Record already has; `ts` defaults to
/// the time of the call.
#[derive(Debug, Default, Clone)]
pub struct RecordPatch {
    pub srs_json: Option<String>,
    pub raw_text: Option<String>,
    pub status: Option<String>,
    pub proposal_json: Option<String>,
    pub pdf_path: Option<String>,
    pub ts: Option<i64>,
}
