// src/services/mod.rs

//! Caller-facing operations. Handlers only translate HTTP to these calls.

pub mod auth;
pub mod catalog;
pub mod moderation;
