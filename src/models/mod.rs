pub mod employee;
pub mod payroll;
pub mod preferences;
pub mod project;
pub mod time_entry;
