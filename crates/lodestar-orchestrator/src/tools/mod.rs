//! Built-in tools.

mod comments;

pub use comments::CommentsTool;
