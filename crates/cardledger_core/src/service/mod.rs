//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate context calls into use-case level APIs.
//! - Keep CLI and other callers decoupled from storage details.

pub mod customer_service;
