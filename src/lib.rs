pub(crate) mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod images;
pub mod observability;
pub mod queue;
pub mod routing;
pub mod state;
pub mod stream;
pub mod transport;

mod util;
