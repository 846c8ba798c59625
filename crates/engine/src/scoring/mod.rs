//! Derived fields: scores and recommendations.
//!
//! Both are pure functions of the consolidated sections, so a cached result
//! carries the same derived fields a fresh computation would produce.

mod recommendations;
mod score;

pub use recommendations::{
    default_rules, load_rules, RecommendationGenerator, RecommendationRule, RecommendationTemplate,
    RulePredicate,
};
pub use score::{scale_value, ScoreEngine};
