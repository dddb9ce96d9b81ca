pub mod careers;
pub mod core;
pub mod staff;
pub mod students;
