pub mod error;
pub mod flatten;
pub mod logger;
pub mod monitor;
pub mod validation;
