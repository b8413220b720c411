use std::sync::Arc;

use crate::auth::password::DecoyHash;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::database::models::Entity;
use crate::database::{DocumentStore, Repository};
use crate::services::{FsImageStore, ImageStore, LogNotifier, ResetNotifier};

/// Shared by every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub images: Arc<dyn ImageStore>,
    pub notifier: Arc<dyn ResetNotifier>,
    pub decoy: Arc<DecoyHash>,
}

impl AppState {
    /// State with the system clock, filesystem uploads and logged reset links.
    pub fn new(config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        let images = Arc::new(FsImageStore::new(&config.uploads.public_dir));
        Self {
            config: Arc::new(config),
            store,
            clock: Arc::new(SystemClock),
            images,
            notifier: Arc::new(LogNotifier),
            decoy: Arc::new(DecoyHash::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImageStore>) -> Self {
        self.images = images;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ResetNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn repo<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.store.clone())
    }
}
