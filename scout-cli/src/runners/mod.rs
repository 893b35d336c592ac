//! Process runner implementations

mod compass;

pub use compass::CompassRunner;
