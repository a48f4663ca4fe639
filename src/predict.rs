//! Three-sample trend heuristic.

use rand::Rng;

use crate::record::Trend;

/// Forecast the next tag from the trend history, using the thread RNG for
/// the cold-start coin flip.
pub fn predict<'a, I>(history: I) -> Trend
where
    I: IntoIterator<Item = &'a Trend>,
    I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
{
    predict_with(history, &mut rand::thread_rng())
}

/// Same as [`predict`] with a caller-supplied RNG.
///
/// With fewer than two samples the result is a fair coin flip. Otherwise the
/// last three samples vote: two or more BIG predicts SMALL, two or more SMALL
/// predicts BIG, and a split falls back to the inverse of the latest tag.
pub fn predict_with<'a, I, R>(history: I, rng: &mut R) -> Trend
where
    I: IntoIterator<Item = &'a Trend>,
    I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
    R: Rng + ?Sized,
{
    let iter = history.into_iter();
    if iter.len() < 2 {
        return if rng.gen_bool(0.5) {
            Trend::Big
        } else {
            Trend::Small
        };
    }

    let tail: Vec<Trend> = iter.rev().take(3).copied().collect();
    let big = tail.iter().filter(|t| **t == Trend::Big).count();
    let small = tail.len() - big;

    if big >= 2 {
        Trend::Small
    } else if small >= 2 {
        Trend::Big
    } else {
        // tail[0] is the most recent sample
        tail[0].inverse()
    }
}
