pub mod config_flow;
pub mod connection;
pub mod entities;
pub mod models;
pub mod outage;
pub mod token;
