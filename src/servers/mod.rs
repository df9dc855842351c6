pub mod registry;

pub use registry::{get_all_servers, get_server_for_file, get_server_for_language, ServerConfig};
