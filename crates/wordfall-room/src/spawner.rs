//! Procedural word generation.
//!
//! The spawner decides *what* falls (tier, text, points), *where* (x) and
//! *how fast*. It also owns the spawn cadence and the room's word id
//! counter, so ids keep increasing across rematches and are never reused.

use std::time::Duration;

use rand::Rng;
use rand::seq::IndexedRandom;
use wordfall_protocol::{Claimant, Tier, WordId, WordView};

const EASY_WORDS: &[&str] = &[
    "cat", "dog", "run", "sun", "hat", "bat", "red", "big", "fun", "cup", "map", "pen",
    "box", "fog", "jam", "key", "leg", "mud", "net", "oak", "pie", "rug", "sky", "top",
    "van", "web", "yak", "zip", "air", "bed", "car", "dip", "egg", "fan", "gum", "hop",
    "ice", "jet", "kit", "lap",
];

const MEDIUM_WORDS: &[&str] = &[
    "python", "script", "coding", "server", "client", "typing", "rocket", "planet",
    "galaxy", "stream", "gaming", "arcade", "battle", "points", "winner", "player",
    "master", "combat", "speedy", "action", "target", "attack", "defend", "shield",
    "weapon", "energy", "sprint", "launch", "boost", "charge", "strike", "rapid",
    "blaster", "cosmic", "stellar",
];

const HARD_WORDS: &[&str] = &[
    "javascript", "typescript", "programming", "development", "multiplayer",
    "competition", "achievement", "leaderboard", "accelerate", "destruction",
    "obliterate", "annihilate", "catastrophe", "magnificent", "spectacular",
    "extravagant", "phenomenal", "outstanding", "incredible", "exceptional",
    "remarkable", "tremendous", "overwhelming", "devastating", "unstoppable",
];

/// Words seeded on the field when a game starts.
pub const SEED_WORDS: usize = 3;

/// Seeded words start somewhere in the top `SEED_BAND` of the field.
const SEED_BAND: f64 = 20.0;

/// Horizontal margin kept free on both edges, in percent.
const EDGE_MARGIN: f64 = 10.0;

const BASE_INTERVAL_MS: f64 = 1500.0;
const INTERVAL_STEP_MS: f64 = 300.0;
const MIN_INTERVAL_MS: f64 = 800.0;

/// Base point value of a tier, before the combo multiplier.
pub fn base_points(tier: Tier) -> u32 {
    match tier {
        Tier::Easy => 10,
        Tier::Medium => 25,
        Tier::Hard => 50,
    }
}

/// The fixed pool a tier draws its text from.
pub fn pool(tier: Tier) -> &'static [&'static str] {
    match tier {
        Tier::Easy => EASY_WORDS,
        Tier::Medium => MEDIUM_WORDS,
        Tier::Hard => HARD_WORDS,
    }
}

/// Maps a uniform draw `u` in `[0, 1)` to a tier. Higher ramps shift
/// probability mass from easy towards hard.
pub fn tier_for(u: f64, ramp: f64) -> Tier {
    if u < 0.5 - 0.1 * ramp {
        Tier::Easy
    } else if u < 0.85 - 0.05 * ramp {
        Tier::Medium
    } else {
        Tier::Hard
    }
}

/// Fall speed per tick for a jitter draw in `[0, 0.3)`.
pub fn speed_for(jitter: f64, ramp: f64, tier: Tier) -> f64 {
    let speed = 0.3 + jitter + 0.1 * ramp;
    if tier == Tier::Hard { speed * 0.8 } else { speed }
}

/// Time between spawns at a given ramp.
pub fn spawn_interval(ramp: f64) -> Duration {
    let ms = (BASE_INTERVAL_MS - INTERVAL_STEP_MS * ramp).max(MIN_INTERVAL_MS);
    Duration::from_micros((ms * 1000.0).round() as u64)
}

/// A live word on a room's field.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub id: WordId,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub points: u32,
    pub tier: Tier,
    pub claimed_by: Option<Claimant>,
}

impl Word {
    pub fn view(&self) -> WordView {
        WordView {
            id: self.id,
            text: self.text.clone(),
            x: self.x,
            y: self.y,
            speed: self.speed,
            points: self.points,
            tier: self.tier,
            claimed_by: self.claimed_by,
        }
    }
}

/// Word generator and spawn timer for one room.
#[derive(Debug, Default)]
pub struct WordSpawner {
    next_id: u64,
    since_last: Duration,
}

impl WordSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts the spawn timer. Called when a game begins.
    pub fn reset_timer(&mut self) {
        self.since_last = Duration::ZERO;
    }

    /// Draws one word at the top of the field.
    pub fn spawn<R: Rng>(&mut self, rng: &mut R, ramp: f64) -> Word {
        let tier = tier_for(rng.random::<f64>(), ramp);
        let text = pool(tier).choose(rng).copied().unwrap_or("word");
        let speed = speed_for(rng.random_range(0.0..0.3), ramp, tier);
        let x = rng.random_range(EDGE_MARGIN..100.0 - EDGE_MARGIN);
        self.next_id += 1;

        Word {
            id: WordId(self.next_id),
            text: text.to_owned(),
            x,
            y: 0.0,
            speed,
            points: base_points(tier),
            tier,
            claimed_by: None,
        }
    }

    /// The opening words of a game, scattered through the top band.
    pub fn seed<R: Rng>(&mut self, rng: &mut R) -> Vec<Word> {
        (0..SEED_WORDS)
            .map(|_| {
                let mut word = self.spawn(rng, 0.0);
                word.y = rng.random_range(0.0..SEED_BAND);
                word
            })
            .collect()
    }

    /// Advances the spawn timer by one tick and spawns a word once the
    /// time since the last spawn exceeds the current interval.
    pub fn advance<R: Rng>(&mut self, rng: &mut R, dt: Duration, ramp: f64) -> Option<Word> {
        self.since_last += dt;
        if self.since_last > spawn_interval(ramp) {
            self.since_last = Duration::ZERO;
            Some(self.spawn(rng, ramp))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_tier_thresholds_at_zero_ramp() {
        assert_eq!(tier_for(0.0, 0.0), Tier::Easy);
        assert_eq!(tier_for(0.49, 0.0), Tier::Easy);
        assert_eq!(tier_for(0.5, 0.0), Tier::Medium);
        assert_eq!(tier_for(0.84, 0.0), Tier::Medium);
        assert_eq!(tier_for(0.85, 0.0), Tier::Hard);
    }

    #[test]
    fn test_ramp_shifts_tiers_harder() {
        // At full ramp easy ends at 0.3 and medium at 0.75.
        assert_eq!(tier_for(0.35, 2.0), Tier::Medium);
        assert_eq!(tier_for(0.8, 2.0), Tier::Hard);
    }

    #[test]
    fn test_python_is_a_medium_word_worth_25() {
        assert!(pool(Tier::Medium).contains(&"python"));
        assert_eq!(base_points(Tier::Medium), 25);
    }

    #[test]
    fn test_hard_words_fall_slower() {
        let easy = speed_for(0.1, 0.0, Tier::Easy);
        let hard = speed_for(0.1, 0.0, Tier::Hard);
        assert!((easy - 0.4).abs() < 1e-9);
        assert!((hard - 0.32).abs() < 1e-9);
    }

    #[test]
    fn test_spawn_interval_shrinks_to_floor() {
        assert_eq!(spawn_interval(0.0), Duration::from_millis(1500));
        assert_eq!(spawn_interval(1.0), Duration::from_millis(1200));
        assert_eq!(spawn_interval(2.0), Duration::from_millis(900));
        assert_eq!(spawn_interval(5.0), Duration::from_millis(800));
    }

    #[test]
    fn test_spawned_words_stay_inside_margins() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut spawner = WordSpawner::new();
        for _ in 0..500 {
            let word = spawner.spawn(&mut rng, 2.0);
            assert!((10.0..90.0).contains(&word.x));
            assert_eq!(word.y, 0.0);
            assert!(word.speed > 0.0);
            assert_eq!(word.points, base_points(word.tier));
            assert!(pool(word.tier).contains(&word.text.as_str()));
        }
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut spawner = WordSpawner::new();
        let first = spawner.seed(&mut rng);
        spawner.reset_timer();
        let second = spawner.seed(&mut rng);
        let ids: Vec<_> = first.iter().chain(&second).map(|w| w.id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_seeded_words_start_in_top_band() {
        let mut rng = StdRng::seed_from_u64(5);
        let words = WordSpawner::new().seed(&mut rng);
        assert_eq!(words.len(), SEED_WORDS);
        assert!(words.iter().all(|w| (0.0..20.0).contains(&w.y)));
    }

    #[test]
    fn test_advance_spawns_after_interval_elapses() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut spawner = WordSpawner::new();
        let dt = Duration::from_millis(50);

        // 1500 ms is not enough: the interval must be exceeded.
        for _ in 0..30 {
            assert!(spawner.advance(&mut rng, dt, 0.0).is_none());
        }
        assert!(spawner.advance(&mut rng, dt, 0.0).is_some());
        assert!(spawner.advance(&mut rng, dt, 0.0).is_none());
    }
}
