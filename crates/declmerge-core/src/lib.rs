pub mod config;
pub mod input;
pub mod logging;
pub mod report;

pub use config::Settings;
pub use input::{build_tree, load_tree, parse_tree, InputError, InputNode};
pub use report::ConflictReport;
