pub mod core;
pub mod dispatcher;
pub mod jobs;
pub mod progress;
