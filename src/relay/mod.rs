//! Client for the asynchronous image/video relay.
//!
//! - `submitter`: posts compiled prompts and follow-up actions.
//! - `poller`: performs one status check per call.
//! - `decode`: turns relay bodies into typed values.
pub mod client;
pub mod decode;
pub mod poller;
pub mod submitter;

pub use client::RelayClient;
pub use decode::PollResult;
pub use poller::JobPoller;
pub use submitter::{ChangeAction, JobSubmitter};
