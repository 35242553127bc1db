//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /items` - Store an item under a key, optional id and parameters
//! - `GET /items/:key`, `GET /items/:key/:id`, `GET /ids/:id` - Point lookups
//! - `POST /search` - Parameter search, optionally degrading
//! - `POST /link/id`, `POST /link/parameters` - Attach handles to an item
//! - `DELETE /items/:key`, `DELETE /items/:key/:id`, `DELETE /ids/:id`, `DELETE /items`
//! - `GET /stats`, `POST /stats/reset` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
