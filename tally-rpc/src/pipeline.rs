//! A directed-acyclic graph of processing stages.
//!
//! Each stage consumes one value and produces one; the runtime then feeds
//! the produced value to every downstream sink, depth-first and in
//! connection order. No concurrency is introduced here; scheduling belongs
//! to the host.

use tally_proto::{FrameWrapper, Packet};

use crate::{RpcError, RpcResult};

/// The tagged value flowing between stages.
#[derive(Debug, Clone)]
pub enum PipeValue {
    Bytes(Vec<u8>),
    Frames(Vec<FrameWrapper>),
    Packets(Vec<Packet>),
    /// Terminal output: nothing is passed downstream.
    Done,
}

/// One processing step.
pub trait Processor: Send {
    fn process(&mut self, input: PipeValue) -> RpcResult<PipeValue>;
}

/// Opaque handle to a stage added to a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageId(usize);

struct StageNode {
    processor: Box<dyn Processor>,
    sinks: Vec<usize>,
}

/// The stage graph. Acyclicity is enforced at connection time.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<StageNode>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, processor: Box<dyn Processor>) -> StageId {
        self.stages.push(StageNode {
            processor,
            sinks: Vec::new(),
        });
        StageId(self.stages.len() - 1)
    }

    /// Route `from`'s output into `to`. Fails when the edge would close a
    /// cycle.
    pub fn connect(&mut self, from: StageId, to: StageId) -> RpcResult<()> {
        if from == to || self.reaches(to.0, from.0) {
            return Err(RpcError::Cycle);
        }
        self.stages[from.0].sinks.push(to.0);
        Ok(())
    }

    fn reaches(&self, from: usize, target: usize) -> bool {
        let mut stack = vec![from];
        let mut visited = vec![false; self.stages.len()];
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if std::mem::replace(&mut visited[node], true) {
                continue;
            }
            stack.extend(&self.stages[node].sinks);
        }
        false
    }

    /// Run `value` through `stage` and recursively through every sink of
    /// each produced value.
    pub fn feed(&mut self, stage: StageId, value: PipeValue) -> RpcResult<()> {
        self.process_then_pass(stage.0, value)
    }

    fn process_then_pass(&mut self, index: usize, value: PipeValue) -> RpcResult<()> {
        let output = self.stages[index].processor.process(value)?;
        if matches!(output, PipeValue::Done) {
            return Ok(());
        }
        let sinks = self.stages[index].sinks.clone();
        for sink in sinks {
            self.process_then_pass(sink, output.clone())?;
        }
        Ok(())
    }
}
