use serde::{Deserialize, Serialize};

use crate::entities::sync_status;
use crate::services::progress::UpdateProgress;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyIndicatorsQuery {
    /// `YYYYMMDD`; defaults to today
    pub trade_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateStatusResponse {
    pub progress: UpdateProgress,
    pub jobs: Vec<sync_status::Model>,
}
