//! SuccessDesk backend: companies, customers, health scores and the
//! Gmail/Calendar sync pipeline behind a JSON API.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod google_api;
pub mod health;
pub mod intelligence;
mod migrations;
pub mod processor;
pub mod recall;
pub mod state;
pub mod sync;
pub mod timeline;
pub mod types;
