//! Payment provider abstraction and the Stripe implementation.

pub mod error;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use provider::PaymentProvider;
