pub mod enforce;
pub mod health;
