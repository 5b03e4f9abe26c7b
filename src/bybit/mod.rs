//! Bybit module - Client implementation for the Bybit v5 REST API

pub mod auth;
pub mod client;
pub mod messages;
pub mod rest;

pub use client::BybitClient;
