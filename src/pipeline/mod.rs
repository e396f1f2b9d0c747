//! Pipeline stages for figure normalisation.
//!
//! Each submodule implements exactly one transformation step. Data only
//! flows forward; no stage calls back into an earlier one.
//!
//! ## Data Flow
//!
//! ```text
//! scan ──▶ extract ──▶ sanitize ──▶ canonical
//! (spans)   (fields)    (caption)    (replacement text)
//! ```
//!
//! 1. [`scan`]     : lazy iterator over candidate figure spans
//! 2. [`extract`]  : image path, declared width, caption, label
//! 3. [`sanitize`] : caption to a single trimmed line
//! 4. [`canonical`]: the fixed-width canonical block
//!
//! The scanner and extractor are the only places that know the markup;
//! [`crate::rewrite::rewrite_spans`] accepts spans from any source.

pub mod canonical;
pub mod extract;
mod lines;
pub mod sanitize;
pub mod scan;
