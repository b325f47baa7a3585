mod checksum;
mod executor;
mod layout;
mod provision;
mod snapshots;
mod tools;

pub use checksum::{sha256_file, sha256_hex, verify_sidecar, write_sidecar};
pub use executor::{Executor, RecoveryAction, Sleeper, ThreadSleeper};
pub use layout::ToolLayout;
pub use provision::{
    ItemOutcome, ItemReport, OperatorDecisions, Provisioner, RunSummary, Unattended,
};
pub use snapshots::{Snapshot, SnapshotManager, ToolState, UpdateOutcome};
pub use tools::{ToolAction, ToolSync};
