//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the oncall-bot:
//! - Chat services (e.g., Slack).
//! - Database services (e.g., SurrealDB).
//! - LLM services (e.g., Anthropic, OpenAI).
//! - MCP tool servers.
//! - Knowledge base retrieval.
//! - Response orchestration tying them together.
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod agent;
pub mod chat;
pub mod db;
pub mod llm;
pub mod mcp;
pub mod rag;
