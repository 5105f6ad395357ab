pub mod command;
pub mod server;
