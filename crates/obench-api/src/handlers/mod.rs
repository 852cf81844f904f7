//! Request handlers, grouped by endpoint family

pub mod health;
pub mod results;

pub use health::*;
pub use results::*;
