//! Progress evaluators: challenges and achievements.
//!
//! Read-only observers over entity events and state; their only writes
//! are their own records and point awards.

pub mod achievements;
pub mod challenges;
pub mod criteria;

pub use achievements::{AchievementLedger, AchievementProgress, AchievementSpec, default_specs};
pub use challenges::{Challenge, ChallengeStatus, ChallengeTracker};
pub use criteria::{Criterion, QueueProbe};
