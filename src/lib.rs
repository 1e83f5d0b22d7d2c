pub mod config;
pub mod environment;
pub mod errors;
pub mod estimator;
pub mod fetcher;
pub mod merge;
pub mod normalization;
pub mod routes;
pub mod song;
pub mod store;
pub mod sync;
