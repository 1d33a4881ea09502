mod shortener;
mod user;

pub use shortener::{
    ping_handler, redirect_handler, shorten_batch_handler, shorten_json_handler,
    shorten_text_handler,
};
pub use user::{delete_user_urls_handler, list_user_urls_handler};
