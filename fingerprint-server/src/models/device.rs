//! Device record responses

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub device_id: String,
    /// `false` when nothing was stored (delete is idempotent)
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct UnlinkResponse {
    pub linked_id: String,
    pub devices_unlinked: usize,
}
