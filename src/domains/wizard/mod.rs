pub mod clock;
pub mod commit;
pub mod detector;
pub mod error;
pub mod explanation;
pub mod models;
pub mod orchestrator;
pub mod repository;
pub mod retriever;
pub mod scoring;
pub mod search_client;
pub mod session_store;
pub mod store_selector;

#[cfg(test)]
pub mod test_support;

pub use clock::{Clock, SystemClock};
pub use error::WizardError;
pub use models::*;
pub use orchestrator::WizardOrchestrator;
pub use repository::{FlyerOfferRepository, ShoppingListRepository};
pub use search_client::FuzzySearchClient;
pub use session_store::SessionStore;
