// Decision value objects
pub mod decision;

// Domain-specific error types
pub mod errors;

// Port interfaces
pub mod ports;

// Core trading types
pub mod types;
