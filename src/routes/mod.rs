pub mod account;
pub mod admin;
pub mod client;
pub mod events;
pub mod provider;
pub mod public;
