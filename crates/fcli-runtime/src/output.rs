//! Records produced by a run, forwarded in emission order to a sink.

use crate::error::{ActionError, ActionResult};
use fcli_core::ResultIndicator;
use fcli_expr::{Evaluator, ValueTemplate, Variables, WithBinding};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Variable the output projection sees the emitted record as.
pub const RECORD: &str = "record";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub output: String,
    pub record: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultIndicator>,
}

/// External record writer. Formatting and column selection are its business.
pub trait OutputSink: Send + Sync + fmt::Debug {
    fn write(&self, record: &OutputRecord) -> ActionResult<()>;

    /// Called once after the run, successful or not.
    fn finish(&self) -> ActionResult<()> {
        Ok(())
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<OutputRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OutputRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn by_output(&self, output: &str) -> Vec<OutputRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.output == output)
            .collect()
    }
}

impl OutputSink for CollectingSink {
    fn write(&self, record: &OutputRecord) -> ActionResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Projects records through a document's output declarations and forwards them.
#[derive(Debug, Clone)]
pub struct OutputPipeline {
    sink: Arc<dyn OutputSink>,
}

impl OutputPipeline {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }

    pub fn emit(
        &self,
        evaluator: &Evaluator,
        outputs: &IndexMap<String, ValueTemplate>,
        scope: &dyn Variables,
        output: &str,
        record: Value,
        result: Option<ResultIndicator>,
    ) -> ActionResult<()> {
        let projection = outputs.get(output).ok_or_else(|| {
            ActionError::configuration(format!("output '{}' is not declared", output))
        })?;
        let vars = WithBinding::new(scope, RECORD, &record);
        let projected = evaluator
            .evaluate_record(projection, &vars)
            .map_err(|e| ActionError::evaluation(format!("outputs.{}", output), e))?;
        tracing::debug!(output, result = ?result.as_ref().map(ResultIndicator::as_str), "emitting record");
        self.sink.write(&OutputRecord {
            output: output.to_string(),
            record: projected,
            result,
        })
    }

    pub fn finish(&self) -> ActionResult<()> {
        self.sink.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcli_expr::FunctionRegistry;
    use serde_json::{json, Map};

    fn evaluator() -> Evaluator {
        Evaluator::new(Arc::new(FunctionRegistry::builtin().unwrap()))
    }

    #[test]
    fn projects_records_through_outputs() {
        let sink = Arc::new(CollectingSink::new());
        let pipeline = OutputPipeline::new(sink.clone());
        let mut outputs = IndexMap::new();
        outputs.insert("raw".to_string(), ValueTemplate::parse(&json!("${record}")).unwrap());
        outputs.insert(
            "summary".to_string(),
            ValueTemplate::parse(&json!({"id": "${record.id}", "label": "${prefix}-${record.id}"})).unwrap(),
        );
        let mut scope = Map::new();
        scope.insert("prefix".to_string(), json!("R"));

        pipeline
            .emit(&evaluator(), &outputs, &scope, "raw", json!({"id": 1, "x": true}), None)
            .unwrap();
        pipeline
            .emit(
                &evaluator(),
                &outputs,
                &scope,
                "summary",
                json!({"id": 2}),
                Some(ResultIndicator::new("AUDITED")),
            )
            .unwrap();

        let records = sink.records();
        assert_eq!(records[0].record, json!({"id": 1, "x": true}));
        assert_eq!(records[1].record, json!({"id": 2, "label": "R-2"}));
        assert_eq!(records[1].result, Some(ResultIndicator::new("AUDITED")));
        assert_eq!(sink.by_output("summary").len(), 1);
    }

    #[test]
    fn undeclared_outputs_are_rejected() {
        let pipeline = OutputPipeline::new(Arc::new(CollectingSink::new()));
        let err = pipeline
            .emit(&evaluator(), &IndexMap::new(), &Map::new(), "nope", json!({}), None)
            .unwrap_err();
        assert!(matches!(err, ActionError::Configuration(_)));
    }
}
