mod amount;

pub mod helpers;
mod secret;

pub use amount::{Amount, AmountConversionError, AMOUNT_DECIMALS, AMOUNT_SCALE};
pub use secret::Secret;
