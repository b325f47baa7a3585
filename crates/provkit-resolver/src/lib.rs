mod candidates;
mod code_host;
mod corrector;
mod policy;
mod selection;
mod vocabulary;

pub use candidates::{
    choose_best, parse_search_output, Candidate, CandidateSource, PackageIndex, PackageSearch,
};
pub use code_host::{
    collect_pages, parse_search_page, CodeHostClient, CodeHostHit, CodeHostSearch,
};
pub use corrector::{is_correctable, record_correction, TokenCorrector};
pub use policy::{
    PendingConfirmation, PendingDecision, PendingSelection, PreparedCommand, Resolution,
    ResolutionPolicy,
};
pub use selection::Selection;
pub use vocabulary::Vocabulary;

#[cfg(test)]
mod tests;
