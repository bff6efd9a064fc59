//! Chat Service - forwards user messages to a text-generation backend and
//! persists each exchange as a conversation turn.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
