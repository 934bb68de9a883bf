//! Built-in Tools
//!
//! # Module Structure
//!
//! - [`calculator`](crate::tools::calculator) - Basic arithmetic
//! - [`python_repl`](crate::tools::python_repl) - Runs Python snippets in a child process
//! - [`registry`](crate::tools::registry) - Tool registration and dispatch
//!
//! # Tool Registry
//!
//! ```ignore
//! let registry = ToolRegistry::with_default_tools(&config.tools);
//! let result = registry
//!     .execute("python_repl", json!({"code": "print(2 ** 10)"}))
//!     .await?;
//! assert_eq!(result["stdout"], "1024\n");
//! ```

/// Calculator tool for arithmetic operations.
pub mod calculator;
/// Python interpreter tool.
pub mod python_repl;
/// Tool registry for managing available tools.
pub mod registry;

pub use registry::{Tool, ToolRegistry};
