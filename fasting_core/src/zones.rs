//! Static catalogue of fasting zones and the zone calculator.
//!
//! Each zone's `threshold_seconds` is the cumulative elapsed time at which
//! that zone *ends*. A fast begins in the first zone; crossing a zone's
//! threshold moves the fast into the next one. Past the last threshold the
//! fast stays in the last zone.

const HOUR: f64 = 3600.0;

/// A named phase of a fast
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub name: &'static str,
    pub threshold_seconds: f64,
    pub emoji: &'static str,
    pub trivia: &'static [&'static str],
    pub benefits: &'static [&'static str],
}

// ============================================================================
// Catalogue
// ============================================================================

pub const ANABOLIC: usize = 0;
pub const CATABOLIC: usize = 1;
pub const FAT_BURNING: usize = 2;
pub const KETOSIS: usize = 3;
pub const AUTOPHAGY: usize = 4;
pub const DEEP_AUTOPHAGY: usize = 5;

static ZONES: [Zone; 6] = [
    Zone {
        name: "Anabolic",
        threshold_seconds: 4.0 * HOUR,
        emoji: "🍽️",
        trivia: &[
            "Your body is digesting and absorbing nutrients.",
            "Insulin levels are high.",
        ],
        benefits: &["Muscle growth and repair.", "Energy replenishment."],
    },
    Zone {
        name: "Catabolic",
        threshold_seconds: 12.0 * HOUR,
        emoji: "⚡",
        trivia: &[
            "Your body starts breaking down stored glycogen.",
            "Glucagon levels begin to rise.",
        ],
        benefits: &["Glycogen depletion, preparing the body for fat burning."],
    },
    Zone {
        name: "Fat Burning",
        threshold_seconds: 16.0 * HOUR,
        emoji: "🔥",
        trivia: &[
            "Your body is running out of glycogen and starts burning fat for fuel.",
            "This is the primary goal of many intermittent fasters.",
        ],
        benefits: &["Increased fat oxidation.", "Weight loss."],
    },
    Zone {
        name: "Ketosis",
        threshold_seconds: 24.0 * HOUR,
        emoji: "🧠",
        trivia: &[
            "Your body is now primarily using ketones for energy.",
            "Ketones are produced from the breakdown of fats in the liver.",
        ],
        benefits: &[
            "Improved insulin sensitivity.",
            "Enhanced cognitive function.",
        ],
    },
    Zone {
        name: "Autophagy",
        threshold_seconds: 48.0 * HOUR,
        emoji: "♻️",
        trivia: &[
            "Autophagy is the body's way of cleaning out damaged cells.",
            "This process is crucial for cellular repair and regeneration.",
        ],
        benefits: &[
            "Cellular cleansing and recycling.",
            "Reduced inflammation.",
        ],
    },
    Zone {
        name: "Deep Autophagy",
        threshold_seconds: 72.0 * HOUR,
        emoji: "✨",
        trivia: &[
            "Your body is in a deep state of cellular cleaning.",
            "Growth hormone levels are significantly elevated.",
        ],
        benefits: &[
            "Maximum cellular renewal.",
            "Potential for increased longevity.",
        ],
    },
];

/// All zones in catalogue order (strictly increasing thresholds)
pub fn all() -> &'static [Zone] {
    &ZONES
}

pub fn first() -> &'static Zone {
    &ZONES[ANABOLIC]
}

pub fn autophagy() -> &'static Zone {
    &ZONES[AUTOPHAGY]
}

/// Look up a zone by display name (case-insensitive)
pub fn by_name(name: &str) -> Option<&'static Zone> {
    ZONES.iter().find(|z| z.name.eq_ignore_ascii_case(name))
}

// ============================================================================
// Calculator
// ============================================================================

/// Catalogue index of the zone a fast is in after `elapsed` seconds.
///
/// Negative, zero and NaN elapsed all land in the first zone.
pub fn zone_index_for(elapsed: f64) -> usize {
    let crossed = ZONES
        .iter()
        .filter(|z| z.threshold_seconds <= elapsed)
        .count();
    crossed.min(ZONES.len() - 1)
}

/// The zone a fast is in after `elapsed` seconds. Pure and total.
pub fn zone_for(elapsed: f64) -> &'static Zone {
    &ZONES[zone_index_for(elapsed)]
}

/// Fraction of the goal completed, clamped to `0.0..=1.0`; 0 without a goal
pub fn zone_progress(elapsed: f64, goal: f64) -> f64 {
    if goal > 0.0 {
        (elapsed / goal).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Seconds spent inside the current zone so far
pub fn time_in_current_zone(elapsed: f64) -> f64 {
    let elapsed = elapsed.max(0.0);
    let index = zone_index_for(elapsed);
    let zone_start = if index == 0 {
        0.0
    } else {
        ZONES[index - 1].threshold_seconds
    };
    elapsed - zone_start
}

/// The zone after the current one, if any
pub fn next_zone(elapsed: f64) -> Option<&'static Zone> {
    ZONES.get(zone_index_for(elapsed) + 1)
}

/// Seconds until the current zone's boundary is crossed; None past the last boundary
pub fn time_to_next_zone(elapsed: f64) -> Option<f64> {
    let elapsed = elapsed.max(0.0);
    let current = zone_for(elapsed);
    if elapsed >= current.threshold_seconds {
        return None;
    }
    Some(current.threshold_seconds - elapsed)
}
