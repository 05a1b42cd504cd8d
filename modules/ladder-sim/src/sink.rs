use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use ladder_engine::{DecisionRecord, DecisionSink};

/// Appends one JSON object per decided turn.
pub struct JsonLinesSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create decision log: {}", path.display()))?;
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn flush(&self) -> Result<()> {
        let mut out = self.out.lock().map_err(|_| anyhow!("decision log lock poisoned"))?;
        out.flush().context("Failed to flush decision log")
    }
}

#[async_trait]
impl DecisionSink for JsonLinesSink {
    async fn persist(&self, record: &DecisionRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialize decision")?;
        let mut out = self.out.lock().map_err(|_| anyhow!("decision log lock poisoned"))?;
        writeln!(out, "{line}").context("Failed to write decision")?;
        Ok(())
    }
}
