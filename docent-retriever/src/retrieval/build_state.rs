//! State machine driving an index build.
//!
//! The builder feeds events in and acts on the phase that comes out; all decisions
//! about when a batch is full, when to checkpoint and when to stop live here so they
//! can be tested without touching files or models.
//!
//! ```text
//! Scanning ──▶ Batching ──(batch full or input exhausted)──▶ Embedding
//!                 ▲  │                                          │
//!                 │  └──(input exhausted, nothing pending)──▶ Done ◀──(last batch)
//!                 │                                          │
//!                 └──────────── Checkpointing ◀──(every N batches)
//! ```
//!
//! `Interrupted` moves any phase straight to `Done` and drops the pending batch.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuildPhase {
    /// Walking the root directory
    Scanning,
    /// Extracting files and filling the pending batch
    Batching,
    /// The pending batch is ready for the embedding provider
    Embedding,
    /// Enough batches completed since the last save
    Checkpointing,
    /// Nothing left to do; the builder performs its final save
    Done,
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BuildPhase::Scanning => "scanning",
            BuildPhase::Batching => "batching",
            BuildPhase::Embedding => "embedding",
            BuildPhase::Checkpointing => "checkpointing",
            BuildPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEvent {
    ScanComplete,
    DocumentQueued,
    InputExhausted,
    BatchEmbedded,
    CheckpointWritten,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event {event:?} is not valid while {phase}")]
pub struct InvalidTransition {
    pub phase: BuildPhase,
    pub event: BuildEvent,
}

/// Position of a build in its lifecycle plus the counters transitions depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildState {
    phase: BuildPhase,
    batch_capacity: usize,
    checkpoint_every: usize,
    pending: usize,
    batches_since_checkpoint: usize,
    input_exhausted: bool,
    interrupted: bool,
}

impl BuildState {
    /// `batch_capacity` and `checkpoint_every` are clamped to at least 1.
    pub fn new(batch_capacity: usize, checkpoint_every: usize) -> Self {
        Self {
            phase: BuildPhase::Scanning,
            batch_capacity: batch_capacity.max(1),
            checkpoint_every: checkpoint_every.max(1),
            pending: 0,
            batches_since_checkpoint: 0,
            input_exhausted: false,
            interrupted: false,
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Apply `event` and return the resulting phase.
    pub fn apply(&mut self, event: BuildEvent) -> Result<BuildPhase, InvalidTransition> {
        use BuildEvent::*;
        use BuildPhase::*;

        let next = match (self.phase, event) {
            (Done, Interrupted) => Done,
            (_, Interrupted) => {
                self.interrupted = true;
                self.pending = 0;
                Done
            }
            (Scanning, ScanComplete) => Batching,
            (Batching, DocumentQueued) => {
                self.pending += 1;
                if self.pending >= self.batch_capacity {
                    Embedding
                } else {
                    Batching
                }
            }
            (Batching, InputExhausted) => {
                self.input_exhausted = true;
                if self.pending > 0 { Embedding } else { Done }
            }
            (Embedding, BatchEmbedded) => {
                self.pending = 0;
                self.batches_since_checkpoint += 1;
                if self.batches_since_checkpoint >= self.checkpoint_every && !self.input_exhausted
                {
                    Checkpointing
                } else if self.input_exhausted {
                    Done
                } else {
                    Batching
                }
            }
            (Checkpointing, CheckpointWritten) => {
                self.batches_since_checkpoint = 0;
                Batching
            }
            (phase, event) => return Err(InvalidTransition { phase, event }),
        };

        self.phase = next;
        Ok(next)
    }
}
