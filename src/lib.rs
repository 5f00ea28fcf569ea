pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod requests;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
