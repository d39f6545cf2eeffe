pub mod config;
pub mod db;
pub mod errors;
pub mod filemaker;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod notify;
pub mod payroll;
pub mod routes;
pub mod utils;
