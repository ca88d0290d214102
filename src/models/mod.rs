pub mod activity;
pub mod conversation;
pub mod inbox;
pub mod message;

pub use activity::{ActivityEntry, ActivityKind};
pub use conversation::ConversationKey;
pub use inbox::{ArchiveIndexEntry, InboxEntry};
pub use message::{
    ArchivedMessage, ContentType, Message, MessageMetadata, MutationNotice, NoticeType, Reaction,
    DELETED_CONTENT_MARKER,
};
