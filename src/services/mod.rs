pub mod activity;
pub mod messages;
pub mod read_merge;
pub mod send;

pub use activity::{ActivityMerger, ActivityService};
pub use messages::MessageService;
pub use read_merge::{PageRequest, ReadMerger};
pub use send::{SendPipeline, SendRequest};
