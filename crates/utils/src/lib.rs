pub mod build_info;
pub mod env;
pub mod logging;
pub mod response;
pub mod update_url;
