pub mod books;
pub mod clients;
pub mod downloads;
pub mod handlers;
pub mod import;
pub mod indexers;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
