//! Asynchronous generation job pipeline: submission API, worker pool, and
//! real-time notification gateway for a music-creation platform.

pub mod auth;
pub mod config;
pub mod context;
pub mod correlation;
pub mod db;
pub mod error;
pub mod gateway;
pub mod model;
pub mod objectstore;
pub mod stream;
pub mod submission;
pub mod worker;
