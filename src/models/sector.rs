use serde::{Deserialize, Serialize};

use crate::services::sector_analytics::Convention;
use crate::services::sector_membership::{ReconcileStats, SectorSaveResult};

#[derive(Debug, Clone, Deserialize)]
pub struct SaveSectorRequest {
    pub name: String,
    /// Codes or names separated by commas, `#` or newlines
    pub stocks: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveSectorResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub result: SectorSaveResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameSectorRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameSectorResponse {
    pub success: bool,
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyChangesQuery {
    #[serde(default)]
    pub convention: Convention,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResponse {
    pub success: bool,
    pub sector_code: String,
    pub stats: ReconcileStats,
}
