pub mod stripe;

pub use stripe::{StripeConfig, StripeProvider};
