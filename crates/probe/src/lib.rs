//! bobqa backend probes
//!
//! Re-derive the calendar focus set from stored records and check what the
//! remote replan function actually did.

pub mod error;
pub mod firestore;
pub mod functions;
pub mod probe;
pub mod store;

pub use error::{ProbeError, ProbeResult};
pub use firestore::FirestoreStore;
pub use functions::{CallableClient, ReplanResponse, ReplanTrigger};
pub use probe::{analyze, Analysis, AnalysisCounts, LiveReport, ReplanProbe};
pub use store::{BlockWindow, Snapshot, SnapshotStore, WorkStore};
