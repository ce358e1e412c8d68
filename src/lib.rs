pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod identity;
pub mod import;
pub mod models;
pub mod remote;
pub mod report;
pub mod routing;
pub mod scoring;
pub mod service;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;
