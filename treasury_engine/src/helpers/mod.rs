mod billing_period;

pub use billing_period::{anchor_date, next_due_date, period_key, MAX_ANCHOR_DAY};
