use crate::chunk::ChunkReader;
use crate::command::CommandCollator;
use crate::{byte_pipe, PipeWriter};
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// In-flight byte batches between the TCP reassembler and one flow worker.
const FLOW_PIPE_CAPACITY: usize = 32;

/// Factory handed to the TCP reassembler: one writer per new flow.
///
/// Mirrors the reassembler-side contract: the reassembler pushes each
/// flow's ordered bytes into the returned writer and drops it when the
/// flow ends.
pub trait FlowFactory {
    fn new_flow(&mut self, label: &str) -> PipeWriter;
}

/// Spawns one chunk demultiplexer + command collator pair per TCP flow and
/// tracks the workers so shutdown can wait for all of them.
pub struct FlowSupervisor {
    results: mpsc::Sender<String>,
    flows: JoinSet<()>,
}

impl FlowSupervisor {
    pub fn new(results: mpsc::Sender<String>) -> Self {
        FlowSupervisor {
            results,
            flows: JoinSet::new(),
        }
    }

    /// Number of flow workers not yet finished.
    pub fn outstanding(&self) -> usize {
        self.flows.len()
    }

    /// Wait for every flow worker to finish. Consumes the supervisor, and
    /// with it this side's handle on the result channel: once the last
    /// collator is gone the channel closes and the printer can exit.
    pub async fn wait(mut self) {
        while let Some(joined) = self.flows.join_next().await {
            if let Err(e) = joined {
                debug!("flow worker: {}", e);
            }
        }
    }
}

impl FlowFactory for FlowSupervisor {
    fn new_flow(&mut self, label: &str) -> PipeWriter {
        debug!("new flow {}", label);
        let (writer, reader) = byte_pipe(FLOW_PIPE_CAPACITY);
        let collator = Arc::new(CommandCollator::new(self.results.clone()));
        let worker = ChunkReader::new(label, collator);
        self.flows.spawn(worker.run(reader));
        writer
    }
}
