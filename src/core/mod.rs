pub mod agent_service;
pub mod agents;
pub mod config;
pub mod conversation;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod research;
pub mod retry;
pub mod terminal;
pub mod tools;
