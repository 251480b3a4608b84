//! Adapters for everything outside the process: the workspace platform REST API, the
//! reporting API used for semantic models and the export stores on disk and in git.

pub mod exports;
pub mod fabric;
pub mod powerbi;
