//! The cooperative-mode bot opponent.

use rand::Rng;
use wordfall_protocol::Difficulty;

/// A synthetic competitor that claims words at random.
///
/// Each tick is one Bernoulli trial. At 20 Hz the expected claim rates
/// are 0.1, 0.4 and 1.0 words per second for easy, medium and hard.
#[derive(Debug, Clone, Copy)]
pub struct BotAgent {
    probability: f64,
}

impl BotAgent {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        let probability = match difficulty {
            Difficulty::Easy => 0.005,
            Difficulty::Medium => 0.02,
            Difficulty::Hard => 0.05,
        };
        Self { probability }
    }

    /// A bot with an arbitrary per-tick probability, clamped to `0..=1`.
    pub fn with_probability(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Per-tick claim probability.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Runs this tick's trial against `candidates` unclaimed words.
    ///
    /// Returns the index of the word to claim, chosen uniformly. The trial
    /// is drawn even when there is nothing to claim, so the random stream
    /// doesn't depend on the field.
    pub fn attempt<R: Rng>(&self, rng: &mut R, candidates: usize) -> Option<usize> {
        if !rng.random_bool(self.probability) || candidates == 0 {
            return None;
        }
        Some(rng.random_range(0..candidates))
    }
}
