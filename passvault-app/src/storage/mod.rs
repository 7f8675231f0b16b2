mod config;
mod store;

pub use config::{load_settings, save_settings, AppSettings, PinKdfSettings, DEFAULT_EXPORT_FILE_NAME};
pub use store::{FileStore, KeyValueStore, MemoryStore, ENTRIES_KEY, PIN_KEY};
