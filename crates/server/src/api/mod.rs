pub mod audit;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod tickets;

pub use middleware::{Actor, ACTOR_HEADER};
pub use routes::create_router;
