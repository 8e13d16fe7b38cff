pub mod app_settings;
pub mod app_state;
pub mod channel;
pub mod feed;
pub mod messages;
pub mod network;
