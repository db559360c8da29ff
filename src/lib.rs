//! tailview — log ingestion core for live agent dashboards.
//!
//! An autonomous agent process appends line-delimited JSON to rotating
//! `iter-<N>.log` files. This crate tails that directory without losing or
//! duplicating data across rotations, truncations, and encoding
//! boundaries, normalizes the wire lines into display records, and renders
//! them into a scrollable fixed-geometry viewport.
//!
//! The pipeline, producer to screen:
//!
//! 1. [`tailer::LogTailer`] watches the directory, follows the
//!    highest-numbered iteration file, and emits [`tailer::TailEvent`]s.
//! 2. [`parse`] turns raw wire lines into [`record::Record`]s.
//! 3. [`viewport::Scrollback`] buffers records with auto-follow scroll
//!    semantics and renders width-exact rows via [`text`] and [`glyph`].
//!
//! The host UI owns the terminal, the draw loop, and key dispatch; it
//! feeds resize and navigation input in and draws the rendered rows out.

pub mod glyph;
pub mod parse;
pub mod record;
pub mod tailer;
pub mod text;
pub mod viewport;

pub use glyph::{Glyph, GlyphSet};
pub use record::{Record, RecordKind};
pub use tailer::{LogTailer, TailEvent};
pub use viewport::{NavAction, Scrollback};
