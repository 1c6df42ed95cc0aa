// src/models/mod.rs

pub mod admin;
pub mod audit;
pub mod quiz;
pub mod submission;
