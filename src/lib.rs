pub mod api;
pub mod classify;
pub mod crypto;
pub mod db;
pub mod error;
pub mod gateway;
pub mod hidden;
pub mod listing;
pub mod output;
pub mod reconstruct;
