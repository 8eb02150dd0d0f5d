// SPDX-License-Identifier: GPL-3.0-only

//! Collaborators the scanning pipeline depends on
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              SessionController              │
//! └──────────┬─────────────────────┬────────────┘
//!            │                     │
//! ┌──────────┴─────────┐ ┌─────────┴──────────┐
//! │     Permission     │ │       Camera       │
//! │ (one-shot request) │ │  (frame sources)   │
//! └────────────────────┘ └────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Frame source trait, frame types, and the producer thread
//! - [`permission`]: Camera permission requests

pub mod camera;
pub mod permission;
