//! Record writers: format output records from a run onto stdout or a file.

use fcli_runtime::{ActionError, ActionResult, OutputRecord, OutputSink};
use serde_json::Value as JsonValue;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Field carrying a record's result indicator in written output.
pub const RESULT_FIELD: &str = "__action__";

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One compact JSON document per line
    #[default]
    Jsonl,
    /// A single pretty-printed JSON array
    Json,
    /// A stream of YAML documents
    Yaml,
}

struct WriterState {
    out: Box<dyn Write + Send>,
    written: usize,
    finished: bool,
}

/// Output sink writing every record of a run in one format.
pub struct RecordWriter {
    format: OutputFormat,
    state: Mutex<WriterState>,
}

impl std::fmt::Debug for RecordWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWriter").field("format", &self.format).finish()
    }
}

impl RecordWriter {
    pub fn new(format: OutputFormat, out: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            state: Mutex::new(WriterState {
                out,
                written: 0,
                finished: false,
            }),
        }
    }

    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, Box::new(io::stdout()))
    }

    pub fn written(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).written
    }
}

/// The record as written: objects get the result indicator as an extra field.
pub fn decorate(record: &OutputRecord) -> JsonValue {
    match (&record.record, &record.result) {
        (JsonValue::Object(map), Some(result)) => {
            let mut map = map.clone();
            map.insert(RESULT_FIELD.to_string(), JsonValue::String(result.as_str().to_string()));
            JsonValue::Object(map)
        }
        (value, _) => value.clone(),
    }
}

fn yaml_error(err: serde_yaml::Error) -> ActionError {
    ActionError::Io(io::Error::new(io::ErrorKind::InvalidData, err))
}

impl OutputSink for RecordWriter {
    fn write(&self, record: &OutputRecord) -> ActionResult<()> {
        let value = decorate(record);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let first = state.written == 0;
        let out = &mut state.out;
        match self.format {
            OutputFormat::Jsonl => {
                serde_json::to_writer(&mut *out, &value).map_err(io::Error::from)?;
                out.write_all(b"\n")?;
            }
            OutputFormat::Json => {
                out.write_all(if first { b"[\n" } else { b",\n" })?;
                serde_json::to_writer_pretty(&mut *out, &value).map_err(io::Error::from)?;
            }
            OutputFormat::Yaml => {
                let text = serde_yaml::to_string(&value).map_err(yaml_error)?;
                out.write_all(b"---\n")?;
                out.write_all(text.as_bytes())?;
            }
        }
        out.flush()?;
        state.written += 1;
        Ok(())
    }

    fn finish(&self) -> ActionResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finished {
            return Ok(());
        }
        state.finished = true;
        if self.format == OutputFormat::Json {
            let closing: &[u8] = if state.written == 0 { b"[]\n" } else { b"\n]\n" };
            state.out.write_all(closing)?;
        }
        state.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcli_core::ResultIndicator;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn records() -> Vec<OutputRecord> {
        vec![
            OutputRecord {
                output: "main".into(),
                record: json!({"id": 1}),
                result: Some(ResultIndicator::success()),
            },
            OutputRecord {
                output: "main".into(),
                record: json!("plain"),
                result: None,
            },
        ]
    }

    fn write_all(format: OutputFormat) -> String {
        let buffer = Shared::default();
        let writer = RecordWriter::new(format, Box::new(buffer.clone()));
        for record in records() {
            writer.write(&record).unwrap();
        }
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.written(), 2);
        buffer.text()
    }

    #[test]
    fn jsonl_writes_one_line_per_record() {
        assert_eq!(
            write_all(OutputFormat::Jsonl),
            "{\"id\":1,\"__action__\":\"SUCCESS\"}\n\"plain\"\n"
        );
    }

    #[test]
    fn json_writes_a_closed_array() {
        let text = write_all(OutputFormat::Json);
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([{"id": 1, "__action__": "SUCCESS"}, "plain"]));

        let buffer = Shared::default();
        let writer = RecordWriter::new(OutputFormat::Json, Box::new(buffer.clone()));
        writer.finish().unwrap();
        assert_eq!(buffer.text(), "[]\n");
    }

    #[test]
    fn yaml_writes_a_document_stream() {
        let text = write_all(OutputFormat::Yaml);
        assert!(text.starts_with("---\nid: 1\n__action__: SUCCESS\n---\n"), "{}", text);
    }
}
