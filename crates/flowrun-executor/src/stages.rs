//! Generic record-at-a-time stage logic.

use async_trait::async_trait;
use flowrun_core::Datum;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};

use crate::error::StageError;
use crate::flow::StageLogic;

type RecordFn = dyn Fn(Datum) -> Option<Datum> + Send + Sync;

/// Applies a function to every record of every input and writes the results
/// to every output.
///
/// Inputs are merged in arrival order; order is kept within one input.
pub struct RecordStage {
    label: &'static str,
    f: Box<RecordFn>,
}

impl RecordStage {
    /// Pass every record through unchanged.
    pub fn identity() -> Self {
        Self::filter_map("identity", Some)
    }

    /// Transform every record.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(Datum) -> Datum + Send + Sync + 'static,
    {
        Self::filter_map("map", move |d| Some(f(d)))
    }

    /// Keep only records matching `predicate`.
    pub fn filter<P>(predicate: P) -> Self
    where
        P: Fn(&Datum) -> bool + Send + Sync + 'static,
    {
        Self::filter_map("filter", move |d| predicate(&d).then_some(d))
    }

    /// Transform records, dropping those mapped to `None`.
    pub fn filter_map<F>(label: &'static str, f: F) -> Self
    where
        F: Fn(Datum) -> Option<Datum> + Send + Sync + 'static,
    {
        Self {
            label,
            f: Box::new(f),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

#[async_trait]
impl StageLogic for RecordStage {
    async fn run(
        &self,
        inputs: Vec<mpsc::Receiver<Datum>>,
        mut outputs: Vec<mpsc::Sender<Datum>>,
    ) -> Result<(), StageError> {
        let mut merged = StreamMap::new();
        for (slot, rx) in inputs.into_iter().enumerate() {
            merged.insert(slot, ReceiverStream::new(rx));
        }

        while let Some((_, datum)) = merged.next().await {
            if let Some(out) = (self.f)(datum) {
                broadcast(self.label, &mut outputs, out).await?;
            }
        }
        Ok(())
    }
}

/// Send a record to every open output, forgetting outputs whose reader left.
async fn broadcast(
    label: &str,
    outputs: &mut Vec<mpsc::Sender<Datum>>,
    datum: Datum,
) -> Result<(), StageError> {
    if outputs.is_empty() {
        return Ok(());
    }
    let mut closed = Vec::new();
    for (slot, tx) in outputs.iter().enumerate() {
        if tx.send(datum.clone()).await.is_err() {
            closed.push(slot);
        }
    }
    for slot in closed.into_iter().rev() {
        outputs.remove(slot);
    }
    if outputs.is_empty() {
        return Err(StageError::OutputClosed(label.to_string()));
    }
    Ok(())
}
