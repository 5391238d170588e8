//! SpeakUp Library
//!
//! Core modules for the SpeakUp voice-first speaking coach.

pub mod capture;
pub mod coach;
pub mod config;
pub mod error;
pub mod playback;
pub mod services;
pub mod turn;
pub mod ui;
