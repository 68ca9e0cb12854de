//! bridge_ratelimit
//!
//! Component F — multi-dimensional sliding-window rate limiting backed
//! by `bridge_store`. Fails **closed**: any store error while checking
//! or incrementing counters is reported as exhausted, never silently
//! admitted (spec §4.F).

use bridge_common::Tier;
use bridge_store::{Store, StoreError};
use rusqlite::{params, Connection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded for dimension {0}")]
    Exceeded(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

fn window_start(now_ms: i64, window_ms: i64) -> i64 {
    (now_ms / window_ms) * window_ms
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MultimediaFeature {
    ImageGen,
    Tts,
    Transcription,
    Video,
    PublicPost,
    TokenRefresh,
}

impl MultimediaFeature {
    fn as_str(&self) -> &'static str {
        match self {
            MultimediaFeature::ImageGen => "image-gen",
            MultimediaFeature::Tts => "tts",
            MultimediaFeature::Transcription => "transcription",
            MultimediaFeature::Video => "video",
            MultimediaFeature::PublicPost => "public-post",
            MultimediaFeature::TokenRefresh => "token-refresh",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitCaps {
    pub global_per_minute: i64,
    pub global_per_hour: i64,
    pub actor_per_minute: i64,
    pub actor_per_hour: i64,
    pub actor_tier_per_minute: i64,
    pub actor_tier_per_hour: i64,
}

impl Default for RateLimitCaps {
    fn default() -> Self {
        Self {
            global_per_minute: 600,
            global_per_hour: 10_000,
            actor_per_minute: 60,
            actor_per_hour: 1_000,
            actor_tier_per_minute: 30,
            actor_tier_per_hour: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultimediaCaps {
    pub per_feature_hourly: i64,
    pub per_feature_daily: i64,
}

impl Default for MultimediaCaps {
    fn default() -> Self {
        Self { per_feature_hourly: 20, per_feature_daily: 100 }
    }
}

struct Dimension {
    limiter_type: &'static str,
    key: String,
    window_ms: i64,
    cap: i64,
}

pub struct RateLimiter<'a> {
    store: &'a Store,
    caps: RateLimitCaps,
    multimedia: MultimediaCaps,
}

impl<'a> RateLimiter<'a> {
    pub fn new(store: &'a Store, caps: RateLimitCaps, multimedia: MultimediaCaps) -> Self {
        Self { store, caps, multimedia }
    }

    /// Checks the global, per-actor, and per-(actor, tier) dimensions
    /// for both minute and hour windows, then atomically increments all
    /// six counters in one transaction. Ordering matches spec §4.F: this
    /// runs after signature verification and before business logic.
    pub fn check_and_increment(&self, actor: &str, tier: Tier, now_ms: i64) -> Result<(), RateLimitError> {
        let dims = vec![
            Dimension {
                limiter_type: "global:minute",
                key: "global".to_string(),
                window_ms: MINUTE_MS,
                cap: self.caps.global_per_minute,
            },
            Dimension {
                limiter_type: "global:hour",
                key: "global".to_string(),
                window_ms: HOUR_MS,
                cap: self.caps.global_per_hour,
            },
            Dimension {
                limiter_type: "actor:minute",
                key: actor.to_string(),
                window_ms: MINUTE_MS,
                cap: self.caps.actor_per_minute,
            },
            Dimension {
                limiter_type: "actor:hour",
                key: actor.to_string(),
                window_ms: HOUR_MS,
                cap: self.caps.actor_per_hour,
            },
            Dimension {
                limiter_type: "actor_tier:minute",
                key: format!("{actor}:{}", tier.as_str()),
                window_ms: MINUTE_MS,
                cap: self.caps.actor_tier_per_minute,
            },
            Dimension {
                limiter_type: "actor_tier:hour",
                key: format!("{actor}:{}", tier.as_str()),
                window_ms: HOUR_MS,
                cap: self.caps.actor_tier_per_hour,
            },
        ];
        self.check_then_increment_all(dims, now_ms)
    }

    pub fn check_and_increment_multimedia(
        &self,
        feature: MultimediaFeature,
        actor: &str,
        now_ms: i64,
    ) -> Result<(), RateLimitError> {
        let key = format!("{actor}:{}", feature.as_str());
        let dims = vec![
            Dimension {
                limiter_type: "multimedia:hour",
                key: key.clone(),
                window_ms: HOUR_MS,
                cap: self.multimedia.per_feature_hourly,
            },
            Dimension { limiter_type: "multimedia:day", key, window_ms: DAY_MS, cap: self.multimedia.per_feature_daily },
        ];
        self.check_then_increment_all(dims, now_ms)
    }

    fn check_then_increment_all(&self, dims: Vec<Dimension>, now_ms: i64) -> Result<(), RateLimitError> {
        let run = || -> Result<(), RateLimitError> {
            let mut conn = self.store.checkout()?;
            let tx = conn.transaction().map_err(StoreError::from)?;

            for dim in &dims {
                let start = window_start(now_ms, dim.window_ms);
                let points = current_points(&tx, dim.limiter_type, &dim.key, start)?;
                if points + 1 > dim.cap {
                    return Err(RateLimitError::Exceeded(format!("{}:{}", dim.limiter_type, dim.key)));
                }
            }

            for dim in &dims {
                let start = window_start(now_ms, dim.window_ms);
                increment(&tx, dim.limiter_type, &dim.key, start)?;
            }

            tx.commit().map_err(StoreError::from)?;
            Ok(())
        };
        // Fail-closed: any store error, including lock contention, is
        // treated as exceeded rather than silently admitting the request.
        run().map_err(|e| match e {
            RateLimitError::Exceeded(d) => RateLimitError::Exceeded(d),
            RateLimitError::Store(s) => {
                tracing::warn!(error = %s, "rate limiter store error, failing closed");
                RateLimitError::Exceeded("store-unavailable".to_string())
            }
        })
    }
}

fn current_points(conn: &Connection, limiter_type: &str, key: &str, window_start: i64) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT points FROM rate_limits WHERE limiter_type = ?1 AND key = ?2 AND window_start = ?3",
        params![limiter_type, key, window_start],
        |r| r.get(0),
    )
    .or_else(|e| if matches!(e, rusqlite::Error::QueryReturnedNoRows) { Ok(0) } else { Err(e) })
    .map_err(StoreError::from)
}

fn increment(conn: &Connection, limiter_type: &str, key: &str, window_start: i64) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO rate_limits (limiter_type, key, window_start, points) VALUES (?1, ?2, ?3, 1)
         ON CONFLICT(limiter_type, key, window_start) DO UPDATE SET points = points + 1",
        params![limiter_type, key, window_start],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(store: &Store) -> RateLimiter<'_> {
        let caps = RateLimitCaps {
            global_per_minute: 2,
            global_per_hour: 100,
            actor_per_minute: 100,
            actor_per_hour: 1000,
            actor_tier_per_minute: 100,
            actor_tier_per_hour: 1000,
        };
        RateLimiter::new(store, caps, MultimediaCaps::default())
    }

    #[test]
    fn admits_until_cap_then_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("bridge.db")).unwrap();
        let rl = limiter(&store);
        rl.check_and_increment("alice", Tier::WriteLocal, 0).unwrap();
        rl.check_and_increment("bob", Tier::WriteLocal, 0).unwrap();
        let err = rl.check_and_increment("carol", Tier::WriteLocal, 0).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded(_)));
    }

    #[test]
    fn new_window_resets_the_counter() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("bridge.db")).unwrap();
        let rl = limiter(&store);
        rl.check_and_increment("alice", Tier::WriteLocal, 0).unwrap();
        rl.check_and_increment("bob", Tier::WriteLocal, 0).unwrap();
        // next minute window, global:minute counter resets
        rl.check_and_increment("carol", Tier::WriteLocal, MINUTE_MS).unwrap();
    }

    #[test]
    fn multimedia_dimension_is_independent_per_feature() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("bridge.db")).unwrap();
        let caps = RateLimitCaps::default();
        let multimedia = MultimediaCaps { per_feature_hourly: 1, per_feature_daily: 10 };
        let rl = RateLimiter::new(&store, caps, multimedia);
        rl.check_and_increment_multimedia(MultimediaFeature::Tts, "alice", 0).unwrap();
        let err = rl.check_and_increment_multimedia(MultimediaFeature::Tts, "alice", 0).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded(_)));
        // a different feature has its own counter
        rl.check_and_increment_multimedia(MultimediaFeature::ImageGen, "alice", 0).unwrap();
    }
}
