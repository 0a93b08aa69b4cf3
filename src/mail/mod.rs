pub mod imap_client;
pub mod mime_text;
pub mod session;
