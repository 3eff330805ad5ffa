pub mod scheduler;
pub mod table;

pub use scheduler::{fire, CronScheduler};
pub use table::CronTable;
