use rand::Rng;
use std::time::Duration;

/// Weighted coin flip: `true` with the given probability.
///
/// Probabilities outside `0.0..=1.0` are clamped, so `0.0` never fires and
/// `1.0` always does.
pub fn should_fire<R: Rng>(probability: f64, rng: &mut R) -> bool {
    rng.gen::<f64>() < probability.clamp(0.0, 1.0)
}

/// Uniform think time in `[min, max]`
pub fn pacing_delay<R: Rng>(min: Duration, max: Duration, rng: &mut R) -> Duration {
    if min >= max {
        return min;
    }
    rng.gen_range(min..=max)
}
