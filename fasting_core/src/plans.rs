//! Built-in fasting plans.

use crate::{Error, Result};

/// Longest custom fast accepted, in hours
pub const MAX_CUSTOM_HOURS: u32 = 72;

/// A named fasting goal
#[derive(Clone, Debug, PartialEq)]
pub struct FastingPlan {
    pub name: &'static str,
    pub hours: u32,
}

impl FastingPlan {
    pub fn goal_seconds(&self) -> f64 {
        f64::from(self.hours) * 3600.0
    }
}

static DEFAULT_PLANS: [FastingPlan; 4] = [
    FastingPlan { name: "16:8", hours: 16 },
    FastingPlan { name: "18:6", hours: 18 },
    FastingPlan { name: "20:4", hours: 20 },
    // One meal a day
    FastingPlan { name: "OMAD", hours: 23 },
];

pub fn default_plans() -> &'static [FastingPlan] {
    &DEFAULT_PLANS
}

/// Find a built-in plan by name (case-insensitive)
pub fn find_plan(name: &str) -> Option<&'static FastingPlan> {
    DEFAULT_PLANS
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

/// Goal in seconds for a custom fast of whole hours
pub fn custom_goal_seconds(hours: u32) -> Result<f64> {
    if hours == 0 || hours > MAX_CUSTOM_HOURS {
        return Err(Error::InvalidGoal(f64::from(hours) * 3600.0));
    }
    Ok(f64::from(hours) * 3600.0)
}
