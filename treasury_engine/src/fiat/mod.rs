mod stripe;

pub use stripe::{StripeConfig, StripeRail};
