pub mod layout;
pub mod linkbase;
pub mod namespaces;
pub mod types;
pub mod xbrl;

#[cfg(test)]
pub mod tests;

pub use types::{Extraction, PresentationRole, RawFact, TaggedElement};
pub use xbrl::extract_facts;
