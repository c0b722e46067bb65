mod client;
mod server;

pub use self::{
    client::ClientConfig,
    server::{Endpoint, EndpointEntry, EndpointTable, ServerConfig},
};
