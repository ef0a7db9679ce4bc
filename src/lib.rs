//! Clipstitch - Aspect-Aware FFmpeg Concat Runner
//!
//! Plans and executes ffmpeg concat jobs for two differently-shaped clips:
//! probes their geometry, derives a shared canvas with per-clip cover-fit
//! crops, builds (or completes) the command line, and supervises the run
//! with streamed progress.

pub mod cli;
pub mod config;
pub mod command;
pub mod error;
pub mod exec;
pub mod plan;
pub mod probe;
pub mod workflow;
