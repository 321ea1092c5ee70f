use serde::Serialize;
use turnstile_storage::StoreStats;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct KindStatsResponse {
    pub kind: &'static str,
    pub live: usize,
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct StoreStatsResponse {
    pub kinds: Vec<KindStatsResponse>,
    pub total_live: usize,
}

impl From<StoreStats> for StoreStatsResponse {
    fn from(stats: StoreStats) -> Self {
        let kinds: Vec<KindStatsResponse> = stats
            .kinds
            .iter()
            .map(|k| KindStatsResponse {
                kind: k.kind.as_str(),
                live: k.live,
                removed: k.removed,
            })
            .collect();
        let total_live = kinds.iter().map(|k| k.live).sum();
        Self { kinds, total_live }
    }
}
