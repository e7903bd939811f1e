//! HTTP request handlers

pub mod material;
pub mod production;
