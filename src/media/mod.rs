mod filename;
mod list;

pub use filename::{destination_path, generate_filename, get_media_extension};
pub use list::{MediaItem, parse_media_list, read_media_list};
