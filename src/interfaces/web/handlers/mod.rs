pub mod agents;
pub mod tools;
