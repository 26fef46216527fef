//! User-facing facade for the FSQ query engine.
//!
//! ```no_run
//! use fsq_client::Engine;
//!
//! let engine = Engine::default();
//! let mut result = engine
//!     .execute("SELECT name FROM 'people.csv' WHERE age >= 25 ORDER BY name", None)
//!     .unwrap();
//! for row in &mut result {
//!     println!("{:?}", row.unwrap());
//! }
//! ```
//!
//! Architecture role:
//! - wires the SQL frontend, planner, readers, and executor together
//! - exposes `execute(sql, default_source)` and `infer_schema(locator)`
//! - surfaces results as a lazy [`QueryResult`] with schema, explain,
//!   warnings, and scan metrics

pub mod engine;
pub mod result;

pub use engine::{execute, infer_schema, Engine};
pub use result::QueryResult;

pub use fsq_common::{
    DataType, EngineConfig, Field, FsqError, OptimizerToggles, Result, Row, Schema, Value,
    Warning,
};
