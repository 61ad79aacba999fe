//! Orchestration over the OpenArchive storage backends: the document state
//! machine, the ingestion saga, the lifecycle scanner and the queue worker.

mod error;
pub mod machine;
pub mod notify;
pub mod retry;
pub mod saga;
pub mod scanner;
pub mod worker;

pub use machine::{StateMachine, TRANSFER_PREP_PRIORITY};
pub use notify::{EmailNotifier, Notifier, NotifyError, NullNotifier, TransitionNotice};
pub use retry::RetryStrategy;
pub use saga::{IngestFile, IngestedDocument, IngestionSaga, ENRICHMENT_PRIORITY};
pub use scanner::{LifecycleReport, LifecycleScanner, SweepOutcome};
pub use worker::{
    BatchReport, EnrichmentHandler, EnrichmentProvider, LifecycleCheckHandler, TaskHandler, Worker,
};
