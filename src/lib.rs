//! Stride: Learning Progression Engine
//!
//! Turns authored activity templates into tracked, resumable, scorable
//! learning runs. Each entity type is persisted independently in one of two
//! interchangeable storage backends; the progression service drives the
//! lifecycle (template -> scenario -> program -> task -> evaluation) on top
//! of a conditional-write protocol instead of locks.

pub mod config;
pub mod content;
pub mod entity;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod progression;
pub mod repository;
pub mod storage;
pub mod types;
