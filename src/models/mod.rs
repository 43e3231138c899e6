pub mod action;
pub mod connection;
pub mod early_access;
pub mod health;
pub mod mail;
pub mod settings;
