#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod api;
pub mod config;
pub mod coordinate;
pub mod crowd;
pub mod error;
pub mod heatmap;
pub mod logs;
pub mod main_db;
pub mod renderer;
pub mod route;
pub mod storage;
pub mod tracking;
mod utils;
