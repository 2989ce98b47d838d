// src/lib.rs

//! AtCoder search batch library: crawl, generate, upload.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
