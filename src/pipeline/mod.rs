//! Pipeline stages between an uploaded document and the remote model.
//!
//! Each submodule implements one step, so the rasteriser or the remote
//! service can be swapped (e.g. for in-memory test doubles) without touching
//! the orchestrators.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ remote
//! (path/URL/  (pdfium)  (PNG,      (VLM extraction
//!  bytes)               base64)     or advisory)
//! ```
//!
//! 1. [`input`] : stage the user's document as a local file with a fresh id
//! 2. [`render`]: the Page Image Source; pdfium runs in `spawn_blocking`
//! 3. [`encode`]: PNG-encode pages and wrap them as multimodal attachments
//! 4. [`remote`]: one chat call per request; the only stage with network I/O

pub mod encode;
pub mod input;
pub mod remote;
pub mod render;
