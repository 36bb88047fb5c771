//! Claim scoring and winner determination.
//!
//! All arithmetic is integer: the combo multiplier is carried in tenths
//! (10 = 1.0x, 20 = 2.0x) so rounding is exact and platform independent.

use wordfall_protocol::TeamId;

/// Multiplier cap, in tenths.
pub const MAX_MULTIPLIER_TENTHS: u32 = 20;

/// Combo multiplier in tenths for a combo value taken *after* the claim
/// incremented it: `min(1 + (combo - 1) * 0.1, 2.0)`.
pub fn multiplier_tenths(combo: u32) -> u32 {
    (10 + combo.saturating_sub(1)).min(MAX_MULTIPLIER_TENTHS)
}

/// Floating point view of [`multiplier_tenths`], for display.
pub fn combo_multiplier(combo: u32) -> f64 {
    f64::from(multiplier_tenths(combo)) / 10.0
}

/// Points awarded for claiming a word worth `base` at `combo`, rounded
/// half-up.
pub fn award_points(base: u32, combo: u32) -> u32 {
    (base * multiplier_tenths(combo) + 5) / 10
}

/// Cooperative result. The humans have to strictly beat the bot; a tie
/// goes to the bot.
pub fn coop_winner(human: u64, bot: u64) -> TeamId {
    if human > bot { TeamId::Human } else { TeamId::Bot }
}

/// Free-for-all result: index of the winner among `scores`, which must be
/// in join order. Among equal top scores the earliest joiner wins.
pub fn ffa_winner(scores: &[u64]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, u64)>, (idx, &score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((idx, score)),
        })
        .map(|(idx, _)| idx)
}
