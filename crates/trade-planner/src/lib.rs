pub mod checklist;
pub mod models;
pub mod planner;

pub use checklist::*;
pub use models::*;
pub use planner::*;

#[cfg(test)]
mod tests;
