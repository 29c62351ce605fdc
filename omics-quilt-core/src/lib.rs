//! Omics Quilt Core - turns storage-creation events into genomics workflow runs
//!
//! A single-sample submitter:
//! - one storage event names one sample manifest
//! - the manifest is loaded from a local file or an object store
//! - one run request is built and sent to the remote job API
//! - run metadata is written next to the run's outputs

pub mod config;
pub mod error;
pub mod event;
pub mod locator;
pub mod manifest;
pub mod notify;
pub mod operations;
pub mod runner;

pub use config::{ConfigContext, ConfigResolver, DEFAULTS, default_values, resolve_key_path};
pub use error::{QuiltError, Result};
pub use event::{StorageEvent, StorageObjectRef};
pub use locator::{DocumentFormat, ResourceAddress, ResourceAttributes, ResourceLocator, Scheme};
pub use manifest::SampleManifest;
pub use notify::{DynTopicPublisher, HttpTopicPublisher, NotificationSink, TopicPublisher};
pub use runner::{
    DisabledRunner, DynWorkflowRunner, HttpWorkflowRunner, JobRequest, JobResult, WorkflowRunner,
    WorkflowType,
};
