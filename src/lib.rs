//! Orchestration of conversational-agent runs on Azure AI Foundry.
//!
//! Submit an instruction on a persistent conversation thread, poll the
//! resulting run under a deadline while relaying progress, retry around the
//! Bing grounding tool's known transient defect, and assemble a
//! citation-annotated answer.

pub mod cli;
pub mod core;
pub mod interfaces;
pub mod logging;
