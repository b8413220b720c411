pub mod images;
pub mod notifier;
pub mod ratings;

pub use images::{FsImageStore, ImageStore};
pub use notifier::{LogNotifier, NotifyError, ResetNotifier};
