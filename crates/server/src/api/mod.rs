mod easynews;
mod handlers;
mod middleware;
mod proxy;
mod routes;
mod streams;

pub use routes::create_router;
