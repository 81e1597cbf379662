/// Report history, newest first.
///
/// Backed by Redis when it is reachable at startup, otherwise by process memory. The Redis
/// backend keeps the whole list as one JSON array:
/// - `carenav:v1:history`: JSON-serialized Vec<Report> (no TTL)
///
/// Every operation holds an async mutex across its read-modify-write cycle.
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use carenav_common::redis::RedisCache;
use carenav_common::report::{decode_history, encode_history, Report};

use crate::error::AppError;

const HISTORY_KEY: &str = "carenav:v1:history";

enum Backend {
    Redis(RedisCache),
    Memory(Vec<Report>),
}

#[derive(Clone)]
pub struct ReportHistory {
    backend: Arc<Mutex<Backend>>,
}

impl ReportHistory {
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory(Vec::new()))
    }

    /// Use Redis at `url` if it answers a PING, otherwise fall back to memory.
    pub async fn connect(url: Option<&str>) -> Self {
        let redis = RedisCache::new(url);
        if redis.is_available().await {
            info!("redis connected, report history is persistent");
            Self::with_backend(Backend::Redis(redis))
        } else {
            info!("redis unavailable, keeping report history in memory");
            Self::in_memory()
        }
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    pub async fn is_persistent(&self) -> bool {
        matches!(*self.backend.lock().await, Backend::Redis(_))
    }

    /// Prepend a report. `Ok(false)` means the history could not be read or the write did not
    /// reach Redis. Stored reports are left untouched in both cases.
    pub async fn save(&self, report: Report) -> Result<bool, AppError> {
        let mut backend = self.backend.lock().await;
        match &mut *backend {
            Backend::Memory(reports) => {
                reports.insert(0, report);
                Ok(true)
            }
            Backend::Redis(redis) => {
                let Some(mut reports) = load(redis).await? else {
                    return Ok(false);
                };
                reports.insert(0, report);
                Ok(redis.set(HISTORY_KEY, &encode_history(&reports)?).await)
            }
        }
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<Report>, AppError> {
        let backend = self.backend.lock().await;
        let reports = match &*backend {
            Backend::Memory(reports) => reports.iter().take(limit).cloned().collect(),
            Backend::Redis(redis) => {
                let mut reports = load(redis).await?.unwrap_or_default();
                reports.truncate(limit);
                reports
            }
        };
        Ok(reports)
    }

    pub async fn get(&self, id: &str) -> Result<Report, AppError> {
        let backend = self.backend.lock().await;
        let found = match &*backend {
            Backend::Memory(reports) => reports.iter().find(|r| r.id == id).cloned(),
            Backend::Redis(redis) => load(redis)
                .await?
                .and_then(|reports| reports.into_iter().find(|r| r.id == id)),
        };
        found.ok_or_else(|| AppError::ReportNotFound(id.to_string()))
    }

    /// Remove one report. Returns `true` if it existed and the removal was stored. Nothing is
    /// written when the history could not be read.
    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let mut backend = self.backend.lock().await;
        match &mut *backend {
            Backend::Memory(reports) => {
                let before = reports.len();
                reports.retain(|r| r.id != id);
                Ok(reports.len() != before)
            }
            Backend::Redis(redis) => {
                let Some(mut reports) = load(redis).await? else {
                    return Ok(false);
                };
                let before = reports.len();
                reports.retain(|r| r.id != id);
                if reports.len() == before {
                    return Ok(false);
                }
                Ok(redis.set(HISTORY_KEY, &encode_history(&reports)?).await)
            }
        }
    }

    /// Remove every report. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, AppError> {
        let mut backend = self.backend.lock().await;
        match &mut *backend {
            Backend::Memory(reports) => {
                let cleared = reports.len();
                reports.clear();
                Ok(cleared)
            }
            Backend::Redis(redis) => {
                // A corrupt record is still cleared.
                let cleared = load(redis).await.ok().flatten().map_or(0, |r| r.len());
                if !redis.delete(HISTORY_KEY).await {
                    warn!("failed to clear report history in redis");
                    return Ok(0);
                }
                Ok(cleared)
            }
        }
    }
}

/// Read the stored history. `Ok(None)` means Redis could not be read; a missing key is an
/// empty history.
async fn load(redis: &RedisCache) -> Result<Option<Vec<Report>>, AppError> {
    let raw = match redis.get_checked(HISTORY_KEY).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, key = HISTORY_KEY, "failed to read report history");
            return Ok(None);
        }
    };
    decode_history(raw.as_deref())
        .map(Some)
        .inspect_err(|e| warn!(error = %e, key = HISTORY_KEY, "stored history is unreadable"))
        .map_err(AppError::from)
}
