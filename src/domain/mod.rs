pub mod demand;
pub mod schedule;
pub mod station;
pub mod synthetic;

pub use demand::*;
pub use schedule::*;
pub use station::*;
pub use synthetic::*;
