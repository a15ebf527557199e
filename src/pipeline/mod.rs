//! In-process document primitives used by the native strategy and the CLI.
//!
//! Each submodule wraps one library capability behind plain functions over
//! byte slices. They are synchronous; async callers run them in
//! `spawn_blocking`.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ pdf::load ──▶ pdf::extract_pages_text ──▶ text::clean_text ──▶ docx::write_docx
//! (path/URL)                                                          └──▶ text::join_pages
//! docx::read_paragraphs ──▶ pdf::build_text_pdf
//! image::prepare_image  ──▶ pdf::build_image_pdf
//! pdf::merge
//! ```
//!
//! 1. [`input`] — load the user-supplied path or URL into a `SourceDocument`
//! 2. [`pdf`]   — parse, extract, build, and merge PDFs (`lopdf`)
//! 3. [`docx`]  — minimal WordprocessingML read/write (`zip`)
//! 4. [`image`] — decode, flatten, shrink, JPEG-encode (`image`)
//! 5. [`text`]  — deterministic cleanup of extracted text

pub mod docx;
pub mod image;
pub mod input;
pub mod pdf;
pub mod text;
