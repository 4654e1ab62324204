/// AVALON sale engine
///
/// - [`reader`]: bindings, balance and snapshot reads with stale-result discard
/// - [`economics`]: pure derivation of tier views from a snapshot
/// - [`flow`]: preview, confirm, submit and finality for one contribution
pub mod economics;
pub mod flow;
pub mod reader;
pub mod types;

pub use flow::{ContributionFlowController, FlowPhase};
pub use reader::ChainStateReader;
pub use types::{
    ContributionOutcome, DerivedView, PendingContribution, SaleBindings, SaleSnapshot,
    TierCatalog, TierDefinition, TierStatus,
};
