//! Martingale staking ladder.
//!
//! A loss doubles the stake and climbs one level, a win drops back to level 1.
//! Climbing past the mode's maximum level ends the run and resets the record.
//! Wins and losses are also written into the trend history as BIG and SMALL,
//! which is what the prediction heuristic reads.

use serde::{Deserialize, Serialize};

use crate::record::{Outcome, Trend, UserRecord};

/// What a single result did to the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LadderOutcome {
    /// Back to level 1
    Won,
    /// Climbed to the next rung
    Advanced { level: u32, bet: u64 },
    /// Ran out of rungs; the record has been reset
    Exhausted { max_level: u32 },
}

/// Apply a result to a record and return the updated copy.
pub fn apply_result(
    record: &UserRecord,
    outcome: Outcome,
    max_level: u32,
) -> (UserRecord, LadderOutcome) {
    let mut next = record.clone();

    match outcome {
        Outcome::Win => {
            next.push_history(Trend::Big);
            next.level = 1;
            next.bet = 1;
            (next, LadderOutcome::Won)
        }
        Outcome::Loss => {
            next.push_history(Trend::Small);
            let level = record.level + 1;
            let bet = record.bet.saturating_mul(2);

            if level > max_level {
                next.reset_ladder();
                (next, LadderOutcome::Exhausted { max_level })
            } else {
                next.level = level;
                next.bet = bet;
                (next, LadderOutcome::Advanced { level, bet })
            }
        }
    }
}
