pub mod catalog;
pub mod payload;

pub use catalog::{channel_for, classify, classify_bookmark_edit, ChannelId};
pub use payload::{decode_channel, encode_channel, DecodedChannel};
