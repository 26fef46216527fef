//! The engine facade: parse → resolve sources → lower → optimize →
//! build operators, returning a lazy [`QueryResult`].

use std::collections::HashMap;

use fsq_common::{EngineConfig, FsqError, Result, Schema, ScanMetrics, Warnings};
use fsq_execution::BoundReaders;
use fsq_planner::{lower, output_schema, validate, Optimizer, SchemaProvider};
use fsq_readers::{open_reader, ReaderContext};
use fsq_sql::ast::SourceRef;
use tracing::debug;

use crate::result::QueryResult;

/// Query engine over file-oriented sources.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Parses and plans `sql`, returning a lazy row iterator.
    ///
    /// Bare (unquoted) FROM sources bind to `default_source` when one is
    /// given; quoted sources are locators in their own right. Parser and
    /// planner errors surface here, before any row is yielded.
    pub fn execute(&self, sql: &str, default_source: Option<&str>) -> Result<QueryResult> {
        let stmt = fsq_sql::parse(sql)?;

        // Inline-path pre-pass: bind-ability of every quoted FROM/JOIN
        // locator is checked before planning completes.
        for locator in fsq_sql::extract_source_locators(sql)? {
            fsq_readers::resolve(&locator)?;
        }

        let warnings = Warnings::new();
        let metrics = ScanMetrics::new();
        let ctx = ReaderContext {
            sample_rows: self.config.infer_sample_rows,
            warnings: warnings.clone(),
            metrics: metrics.clone(),
        };

        // Bind a fresh reader to every FROM/JOIN source, in plan order.
        // The same path twice means two independent readers.
        let mut sources: Vec<&SourceRef> = vec![&stmt.from];
        sources.extend(stmt.joins.iter().map(|j| &j.source));

        let mut readers: BoundReaders = Vec::with_capacity(sources.len());
        let mut provider = ResolvedSources::default();
        for source in sources {
            let locator = self.locator_for(source, default_source);
            let binding = source.binding().to_string();
            debug!(binding, locator = %locator, "opening reader");
            let mut reader = open_reader(&locator, ctx.clone(), self.config.fetch.clone())?;
            let schema = reader.schema()?;
            let partitions = reader.partition_columns();
            provider.bind(binding.clone(), schema, partitions);
            readers.push((binding, reader));
        }

        let plan = lower(&stmt, &provider)?;
        validate(&plan)?;
        let (plan, audit) = Optimizer::new(self.config.optimizer).optimize(plan);
        validate(&plan)?;

        let schema = output_schema(&plan)?;
        let root = fsq_execution::build(&plan, &mut readers)?;
        Ok(QueryResult::new(root, schema, plan, audit, warnings, metrics))
    }

    /// Resolves a locator and returns the source's inferred schema.
    pub fn infer_schema(&self, locator: &str) -> Result<Schema> {
        let ctx = ReaderContext {
            sample_rows: self.config.infer_sample_rows,
            warnings: Warnings::new(),
            metrics: ScanMetrics::new(),
        };
        let mut reader = open_reader(locator, ctx, self.config.fetch.clone())?;
        reader.schema()
    }

    fn locator_for(&self, source: &SourceRef, default_source: Option<&str>) -> String {
        if !source.quoted {
            if let Some(default) = default_source {
                return default.to_string();
            }
        }
        source.locator.clone()
    }
}

/// Executes a query with a default engine configuration.
pub fn execute(sql: &str, default_source: Option<&str>) -> Result<QueryResult> {
    Engine::default().execute(sql, default_source)
}

/// Infers a source schema with a default engine configuration.
pub fn infer_schema(locator: &str) -> Result<Schema> {
    Engine::default().infer_schema(locator)
}

#[derive(Default)]
struct ResolvedSources {
    map: HashMap<String, (Schema, Vec<String>)>,
}

impl ResolvedSources {
    fn bind(&mut self, binding: String, schema: Schema, partitions: Vec<String>) {
        self.map.insert(binding, (schema, partitions));
    }
}

impl SchemaProvider for ResolvedSources {
    fn source_schema(&self, binding: &str) -> Result<Schema> {
        self.map
            .get(binding)
            .map(|(s, _)| s.clone())
            .ok_or_else(|| FsqError::Schema(format!("no source bound to '{binding}'")))
    }

    fn partition_columns(&self, binding: &str) -> Vec<String> {
        self.map
            .get(binding)
            .map(|(_, p)| p.clone())
            .unwrap_or_default()
    }
}
