//! tabvault - a shared-state JSON document server
//!
//! One mutable dataset of named tabs, replaced wholesale by concurrent
//! clients under optimistic concurrency control, stored either in a local
//! JSON file or in an embedded relational database.

pub mod cli;
pub mod dataset;
pub mod http_server;
pub mod observability;
pub mod presence;
pub mod storage;
pub mod store;
