pub mod analyze;
pub mod rates;
