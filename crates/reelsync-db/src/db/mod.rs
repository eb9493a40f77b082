//! Database repositories for the data access layer
//
// Upload lifecycle records
pub mod record;
//
// Pool setup and migrations
pub mod setup;

pub use record::RecordRepository;
pub use setup::connect_pool;
