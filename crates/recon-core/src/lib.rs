pub mod ids;
pub mod outcomes;
pub mod reply;
pub mod report;
pub mod runlog;
pub mod snapshot;
pub mod template;
pub mod types;

pub use ids::*;
pub use outcomes::*;
pub use reply::*;
pub use report::*;
pub use runlog::*;
pub use snapshot::*;
pub use template::*;
pub use types::*;
