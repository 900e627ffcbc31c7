pub mod dedup;
pub mod diversity;
pub mod filter;
pub mod posters;
pub mod providers;
pub mod random;
pub mod relation;
pub mod results_logger;
pub mod session;

pub use diversity::DiversitySampler;
pub use filter::ContentFilter;
pub use posters::PosterResolver;
pub use providers::{CatalogProvider, TmdbProvider};
pub use random::RandomSource;
pub use relation::RelationSampler;
pub use results_logger::{EventWriter, ResultsLogger, ResultsLoggerHandle, SheetWriter, TraceWriter};
pub use session::{Ignored, Outcome, SelectionSession, SessionContext, SessionSettings};
