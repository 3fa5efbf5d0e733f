pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ApexError;
pub use types::{
    AdvancedFilter, CancelFlag, DecisionMaker, Lead, LeadAnalysis, LeadSource, LeadStatus,
    SearchConfig, SearchIntent, SearchMode,
};
