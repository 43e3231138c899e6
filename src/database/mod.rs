pub mod connection;
pub mod early_access;
pub mod postgres_repository;
pub mod session;
pub mod settings;
