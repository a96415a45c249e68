pub mod files;
pub mod health;
pub mod images;
pub mod models;
pub mod passthrough;
