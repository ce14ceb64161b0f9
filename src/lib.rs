pub mod api;
pub mod cli;
pub mod config;
pub mod control;
pub mod credential;
pub mod error;
pub mod models;
pub mod network;
pub mod progress;
pub mod restore;
pub mod scheduler;
pub mod state;
