//! Session controller: binds mode selections, period numbers and results to
//! the staking ladder.
//!
//! Every read-modify-write on a user record runs under that user's entry in
//! a keyed lock table, so two events for the same user never interleave.
//! Events for different users proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::config::LadderConfig;
use crate::ladder::{apply_result, LadderOutcome};
use crate::predict::predict;
use crate::record::{Mode, Outcome, Phase, Trend, UserId, UserRecord};
use crate::store::{StoreResult, UserStore};

/// Result of a mode selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeOutcome {
    Started(Mode),
    /// VIP requested without the entitlement; nothing changed
    VipRequired,
}

/// Result of a period submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodOutcome {
    Presented {
        next_period: u64,
        prediction: Trend,
        level: u32,
        bet: u64,
    },
    /// Not a period number; ignored
    Ignored,
    /// No record yet
    NotStarted,
    /// Record exists but no mode has been chosen
    ModeNotSelected,
}

/// Result of a WIN/LOSS selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOutcome {
    Applied(LadderOutcome),
    /// No record; dropped
    NotStarted,
    /// No prediction is waiting for a result
    NotAwaitingResult,
}

/// Result of an administrative VIP grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted,
    NotFound,
}

/// True when `raw` is a run of at least three ASCII digits
pub fn is_period_token(raw: &str) -> bool {
    raw.len() >= 3 && raw.bytes().all(|b| b.is_ascii_digit())
}

pub struct SessionController {
    store: Arc<dyn UserStore>,
    ladder: LadderConfig,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl SessionController {
    pub fn new(store: Arc<dyn UserStore>, ladder: LadderConfig) -> Self {
        Self {
            store,
            ladder,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub fn max_level(&self, mode: Mode) -> u32 {
        match mode {
            Mode::Free => self.ladder.free_max_level,
            Mode::Vip => self.ladder.vip_max_level,
        }
    }

    async fn lock_user(&self, id: UserId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().await;
            locks.entry(id).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Checked before locking, so ids without a record never get a lock slot.
    async fn is_known(&self, id: UserId) -> StoreResult<bool> {
        Ok(self.store.get(id).await?.is_some())
    }

    /// Create the record on first contact. Existing records are left alone.
    pub async fn ensure_user(&self, id: UserId) -> StoreResult<UserRecord> {
        let _guard = self.lock_user(id).await;
        if let Some(record) = self.store.get(id).await? {
            return Ok(record);
        }
        let record = UserRecord::new(id);
        self.store.upsert(record.clone()).await?;
        info!(user_id = id, "new user");
        Ok(record)
    }

    /// Start a fresh run in `mode`.
    pub async fn select_mode(&self, id: UserId, mode: Mode) -> StoreResult<ModeOutcome> {
        let _guard = self.lock_user(id).await;
        let mut record = self
            .store
            .get(id)
            .await?
            .unwrap_or_else(|| UserRecord::new(id));

        if mode == Mode::Vip && !record.vip {
            info!(user_id = id, "vip mode refused, no entitlement");
            return Ok(ModeOutcome::VipRequired);
        }

        record.mode = mode;
        record.reset_ladder();
        record.phase = Phase::AwaitingPeriod;
        record.touch();
        self.store.upsert(record).await?;

        info!(user_id = id, mode = %mode, "mode selected");
        Ok(ModeOutcome::Started(mode))
    }

    /// Present the period after the last one and a prediction for it.
    ///
    /// The raw digits only seed the very first period of a run; after that
    /// the stored period is advanced by one regardless of what was typed.
    pub async fn submit_period(&self, id: UserId, raw: &str) -> StoreResult<PeriodOutcome> {
        let raw = raw.trim();
        if !is_period_token(raw) {
            return Ok(PeriodOutcome::Ignored);
        }
        if !self.is_known(id).await? {
            return Ok(PeriodOutcome::NotStarted);
        }

        let _guard = self.lock_user(id).await;
        let Some(mut record) = self.store.get(id).await? else {
            return Ok(PeriodOutcome::NotStarted);
        };
        if record.phase == Phase::AwaitingMode {
            return Ok(PeriodOutcome::ModeNotSelected);
        }

        let base = if record.period == 0 {
            match raw.parse::<u64>() {
                Ok(p) => p,
                Err(_) => {
                    debug!(user_id = id, raw, "period out of range");
                    return Ok(PeriodOutcome::Ignored);
                }
            }
        } else {
            record.period
        };
        let Some(next_period) = base.checked_add(1) else {
            return Ok(PeriodOutcome::Ignored);
        };

        let prediction = predict(&record.history);

        record.period = next_period;
        record.phase = Phase::AwaitingResult;
        record.touch();
        let (level, bet) = (record.level, record.bet);
        self.store.upsert(record).await?;

        info!(
            user_id = id,
            period = next_period,
            prediction = %prediction,
            level,
            bet,
            "prediction presented"
        );
        Ok(PeriodOutcome::Presented {
            next_period,
            prediction,
            level,
            bet,
        })
    }

    /// Apply a WIN/LOSS to the ladder of the user's current mode.
    pub async fn submit_result(&self, id: UserId, outcome: Outcome) -> StoreResult<ResultOutcome> {
        if !self.is_known(id).await? {
            debug!(user_id = id, "result from unknown user dropped");
            return Ok(ResultOutcome::NotStarted);
        }
        let _guard = self.lock_user(id).await;
        let Some(record) = self.store.get(id).await? else {
            debug!(user_id = id, "result from unknown user dropped");
            return Ok(ResultOutcome::NotStarted);
        };
        if record.phase != Phase::AwaitingResult {
            debug!(user_id = id, phase = ?record.phase, "stale result ignored");
            return Ok(ResultOutcome::NotAwaitingResult);
        }

        let max_level = self.max_level(record.mode);
        let (mut next, ladder) = apply_result(&record, outcome, max_level);
        next.phase = match ladder {
            LadderOutcome::Exhausted { .. } => Phase::AwaitingMode,
            _ => Phase::AwaitingPeriod,
        };
        next.touch();
        self.store.upsert(next).await?;

        info!(user_id = id, outcome = ?outcome, ladder = ?ladder, "result applied");
        Ok(ResultOutcome::Applied(ladder))
    }

    /// Grant the VIP entitlement and switch the user to VIP mode. The ladder
    /// position is kept.
    pub async fn grant_vip(&self, id: UserId) -> StoreResult<GrantOutcome> {
        if !self.is_known(id).await? {
            return Ok(GrantOutcome::NotFound);
        }
        let _guard = self.lock_user(id).await;
        let Some(mut record) = self.store.get(id).await? else {
            return Ok(GrantOutcome::NotFound);
        };
        record.vip = true;
        record.mode = Mode::Vip;
        record.touch();
        self.store.upsert(record).await?;

        info!(user_id = id, "vip granted");
        Ok(GrantOutcome::Granted)
    }
}
