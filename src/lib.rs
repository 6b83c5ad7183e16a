//! Run shell-command requests embedded in Typst documents.
//!
//! Documents publish request records through the Typst-side library; this
//! crate queries them, evaluates each request's commands inside a per-call
//! sandbox directory under an interactive allow/ask/forbid policy, and
//! writes the captured output back as Typst source for the document to read
//! on its next compilation.

pub mod cancel;
pub mod eval;
pub mod format;
pub mod lines;
pub mod model;
pub mod parse;
pub mod policy;
pub mod typst;
pub mod value;
pub mod watch;
