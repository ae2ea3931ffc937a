pub mod api;
pub mod app;
pub mod classification;
pub mod config;
pub mod db;
pub mod dependency_graph;
pub mod derivation;
pub mod error;
pub mod formulas;
pub mod scheduler;
pub mod services;
pub mod views;
