//! Library crate for reel-pick: rules, round services, storage backends and the HTTP surface.

pub mod config;
pub mod dao;
mod dto;
pub mod error;
pub mod routes;
pub mod rules;
pub mod services;
pub mod state;
