pub mod node_service;

pub use node_service::{NodeListing, NodeService};
