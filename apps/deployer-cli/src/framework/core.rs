//! The deployment engine: solution plans, redirect maps, per item type deployers, orphan
//! cleanup and export.

pub mod deployers;
pub mod deployment_plan;
pub mod execute;
pub mod export;
pub mod item_definition;
pub mod orphans;
pub mod redirects;
pub mod remote_jobs;
pub mod solution_plan;
pub mod sources;
pub mod stages;
pub mod substitution;
