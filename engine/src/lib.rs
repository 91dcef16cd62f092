//! SkillPath Engine Library
//!
//! This library provides the core functionality of the SkillPath engine:
//! the career-path workflow orchestrator and the clients for its five
//! external collaborators (semantic retrieval, reasoning LLM, course-search
//! tool gateway, code sandbox, and tracing sink).

/// Configuration management module
pub mod config;

/// Telemetry and observability
pub mod telemetry;

/// Core data model shared across stages
pub mod types;

/// Reasoning (LLM) client abstraction and FriendliAI implementation
pub mod llm;

/// Generated-code safety filter and fallback snippets
pub mod safety;

/// Semantic knowledge retrieval client
pub mod retrieval;

/// Tool gateway client (course search)
pub mod tools;

/// Sandboxed code validation client
pub mod sandbox;

/// Request-scoped trace recording
pub mod trace;

/// Workflow orchestrator composing the pipeline
pub mod orchestrator;
