//! SeaORM entities mapping to the Postgres tables.

pub mod channel_config;
pub mod domain;
pub mod monitor_registration;
pub mod notification_history;
pub mod user;

// Prelude module for easy importing of all entities and their related types
pub mod prelude {
    pub use super::user::Entity as User;

    pub use super::domain::Entity as Domain;
    pub use super::domain::Model as DomainModel;

    pub use super::monitor_registration::Entity as MonitorRegistration;
    pub use super::monitor_registration::Model as MonitorRegistrationModel;

    pub use super::channel_config::Entity as ChannelConfig;
    pub use super::channel_config::Model as ChannelConfigModel;

    pub use super::notification_history::Entity as NotificationHistory;
    pub use super::notification_history::Model as NotificationHistoryModel;
}
