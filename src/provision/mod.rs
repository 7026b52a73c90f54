pub mod lifecycle;
pub mod orchestrator;
pub mod poller;
