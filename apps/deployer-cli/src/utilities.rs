pub mod constants;
pub mod duration;
pub mod git;
pub mod json;
