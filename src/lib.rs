#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod api;
pub mod backend;
mod logs;
pub mod narrator;
pub mod position_tracker;
pub mod prefs_db;
pub mod route_geometry;
pub mod route_vector;
pub mod routing;
pub mod safety_score;
pub mod score_server;
pub mod tracking_session;
