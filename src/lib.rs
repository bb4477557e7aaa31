pub mod cache;
pub mod canvas;
pub mod config;
pub mod error;
pub mod expand_state;
pub mod gateway;
pub mod geometry;
pub mod graph;
pub mod notice;
pub mod panel;
pub mod path;
pub mod transfer;
pub mod tree;
pub mod workspace;
