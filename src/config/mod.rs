pub mod app_config;
pub mod probe_config;
pub mod request_file;
