pub mod api;
pub mod db;
pub mod liander_http;
