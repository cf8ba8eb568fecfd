pub mod channel_service;
pub mod domain_service;
pub mod history_service;

pub use channel_service::PgChannelStore;
pub use domain_service::PgDomainStore;
pub use history_service::PgHistoryStore;
