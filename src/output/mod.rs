pub mod report;
pub mod results_dir;
