pub mod benchmark;
pub mod events;
pub mod model;
pub mod results;
pub mod stats;

pub use benchmark::*;
pub use events::*;
pub use model::*;
pub use results::*;
pub use stats::*;
