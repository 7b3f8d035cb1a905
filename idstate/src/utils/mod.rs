// Utilities Module
pub mod time;
