//! Staged bookmark capture and additive re-apply.
//!
//! A live bookmark tree is flattened into a single persisted snapshot (the
//! stage), which can be exported, replaced by an import, and pushed back into
//! a tree without duplicating URLs already there.

pub mod bookmark;
pub mod clock;
pub mod codec;
pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod host;
pub mod kv;
pub mod metadata;
pub mod notify;
pub mod progress;
pub mod resolver;
pub mod scheduler;
pub mod staging;
pub mod tree;
pub mod validator;

pub use bookmark::BookmarkRecord;
pub use engine::{plan_push, ExportOutcome, NothingToSync, OperationState, PushOutcome, StageEngine};
pub use error::{HostError, Result, StageError, StoreError};
