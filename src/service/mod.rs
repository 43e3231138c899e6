pub mod cache;
pub mod connection;
pub mod early_access;
pub mod email;
pub mod mail;
pub mod settings;
