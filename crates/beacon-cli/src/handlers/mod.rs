//! Command handlers

pub mod register;
pub mod resolve;
pub mod status;
