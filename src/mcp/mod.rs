//! The Tool Server Manager subsystem: JSON-RPC wire types, the three
//! transport adapters, and the manager that owns them.

pub mod manager;
pub mod protocol;
pub mod transport;
