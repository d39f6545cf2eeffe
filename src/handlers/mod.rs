pub mod auth;
pub mod employee;
pub mod health;
pub mod jobs;
pub mod payroll;
pub mod preferences;
pub mod project;
pub mod time_entry;
