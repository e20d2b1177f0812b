//! Mutadi - a community blog with member profiles and private messaging
//!
//! This library provides everything the `mutadi` binary serves: the data
//! layer, the services holding the site's rules, and the HTML web layer.

pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod render;
pub mod services;
pub mod web;
