use serde::{Deserialize, Serialize};

/// Reference to an uploaded file, as returned by the blob store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobHandle {
    pub url: String,
    pub public_id: String,
}
