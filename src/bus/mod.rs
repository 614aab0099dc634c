pub mod arbiter;
pub mod driver;
