pub mod rest;
pub mod server;

pub use server::ApiServer;
