//! Debate document parsing: file discovery, version filtering, and the
//! context-tracking walk that turns markup into utterance rows.

pub mod context;
pub mod debates;

pub use context::{ContextFrame, ContextSlot};
pub use debates::{extract_date, extract_person_id, parse_document, DebateLoader, UtteranceIter};
