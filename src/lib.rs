pub mod aggregate;
pub mod bovado_fetch;
pub mod config;
pub mod estimate;
pub mod fuzz;
pub mod http_client;
pub mod model;
pub mod payload;
pub mod pipeline;
pub mod prizepicks_fetch;
pub mod prop_table;
pub mod publish;
pub mod resolver;
pub mod store;
pub mod underdog_fetch;
