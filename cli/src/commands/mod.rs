pub mod agent;
pub mod boundaries;
pub mod check;
