//! Service layer
//!
//! Process spawning, progress parsing, metric estimation and the session
//! supervisor that ties them together, plus recorded file storage and the
//! stream key registry.

pub mod command_profile;
pub mod metrics_estimator;
pub mod metrics_store;
pub mod process_runner;
pub mod progress_parser;
pub mod session_supervisor;
pub mod stream_keys;
pub mod vod_storage;

pub use command_profile::{CommandProfiles, CommandSpec, check_ffmpeg_availability};
pub use metrics_estimator::MetricsEstimator;
pub use metrics_store::{MetricsEvent, MetricsStore};
pub use process_runner::{
    ProcessCommand, ProcessControl, ProcessEvents, ProcessHandle, ProcessRunner, TokioProcessRunner,
};
pub use progress_parser::ProgressParser;
pub use session_supervisor::SessionSupervisor;
pub use stream_keys::StreamKeyRegistry;
pub use vod_storage::{RecordingInfo, VodPathGenerator, VodStorage};
