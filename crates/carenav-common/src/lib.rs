pub mod department;
pub mod error;
pub mod guidance;
pub mod language;
pub mod llm;
pub mod mcp_api;
pub mod redis;
pub mod report;
pub mod urgency;
