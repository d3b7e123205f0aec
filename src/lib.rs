//! Marquee - media playback server for unattended displays.
//!
//! An operator picks a file from a shared media library and one or more
//! display clients show it, with the selection changing live without a push
//! channel. All live state is file-resident and tiny:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     CONTROL SURFACES                         │
//! │  admin view, CLI: select / preset / upload / delete          │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ typed commands
//! ┌──────────────────────────────┴───────────────────────────────┐
//! │                    UPDATE COORDINATOR                        │
//! │  validates against the library, mutates the stores           │
//! │  atomically, returns typed results                           │
//! └──────┬──────────────────┬────────────────────┬───────────────┘
//!        │                  │                    │
//! ┌──────┴───────┐ ┌────────┴────────┐ ┌─────────┴─────────┐
//! │ selection    │ │ preset store    │ │ library directory │
//! │ store        │ │ (config.json)   │ │ (media files)     │
//! │ (name|token) │ │                 │ │                   │
//! └──────┬───────┘ └────────┬────────┘ └─────────┬─────────┘
//!        └──────────────────┴────────────────────┘
//!                           │ polled, never written
//! ┌──────────────────────────┴──────────────────────────────────┐
//! │                        READERS                              │
//! │  display surface, file monitor: fetch on a cadence,         │
//! │  compare change tokens, back off when the server is gone    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key properties
//!
//! - **Wholesale replace**: stores are rewritten via temp-and-rename, so a
//!   reader sees either the old or the new record, never a mix.
//! - **Last write wins**: concurrent control requests all succeed; the final
//!   record is exactly one of them, with a strictly advancing change token.
//! - **Stale by design**: deleting a file never clears the selection or
//!   presets that reference it; the stale reference surfaces as a not-found
//!   failure only if activated later.

/// REST API.
pub mod api;

/// Update coordinator: the single mutation surface.
pub mod coordinator;

/// Media library directory access.
pub mod library;

/// Poll-based reader protocol.
pub mod poll;

/// File-resident state stores.
pub mod store;
