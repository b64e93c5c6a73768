pub mod handler;
pub mod msg_activity_handler;
pub mod msg_cursor_handler;
pub mod msg_document_handler;
pub mod msg_ping_handler;
pub mod msg_sync_handler;
pub mod msg_typing_handler;
