//! Domain models for the charging engine

pub mod account;
pub mod action;
pub mod calendar;
pub mod profile;
pub mod rate;
pub mod shared_group;

pub use account::{Account, Balance, BalanceFilter, BALANCE_MONETARY, BALANCE_VOICE};
pub use action::{
    sort_actions_by_weight, Action, ActionTiming, ActionTrigger, ThresholdType, FILTER_DISABLED,
    FILTER_ENABLED, FILTER_HAS_BALANCE,
};
pub use calendar::{parse_offset, parse_time_of_day, CalendarSpec, ASAP};
pub use profile::{
    any_subject_key, profile_key, CallDescriptor, RatingInfo, RatingPlanActivation, RatingProfile,
    ANY_SUBJECT,
};
pub use rate::{normalize_destination, RateInterval, RateSlot, RatingPlan, ANY_DESTINATION};
pub use shared_group::{SharedGroup, SharingStrategy, ANY_MEMBER};
