pub mod comment_handlers;
