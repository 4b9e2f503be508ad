//! Tool requirements, the persistent registry, and code synthesis.
//!
//! Tools are standalone Python scripts. The resolver decides which ones a
//! query needs, the registry supplies any that were built before, and the
//! synthesizer writes the rest for human review.

pub mod docs;
mod registry;
mod requirement;
pub mod review;
mod synthesizer;

pub use docs::{DocPage, DocRetriever, HttpDocRetriever, StaticDocRetriever};
pub use registry::{RegistryEntry, StoreOutcome, ToolRegistry, find_match};
pub use requirement::{ToolKind, ToolRequirement};
pub use review::{ReviewNotes, number_lines, review_code};
pub use synthesizer::{
    CodeSynthesizer, GENERIC_SERVICE, NO_CODE_FOUND, SynthesisOutcome, SynthesisRequest,
    clean_service_name, ensure_credential_placeholder,
};
