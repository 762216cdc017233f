pub mod model;
pub mod roster;
