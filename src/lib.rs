pub mod api;
pub mod auth;
pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod notify;
pub mod outbox;
pub mod recommend;
