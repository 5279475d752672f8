use crate::core::backend::Backend;
use crate::core::catalog::CatalogProvider;
use crate::core::lists::ListManager;
use crate::core::metadata::MetadataClient;
use crate::core::session::{SessionOptions, SessionStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the UI layer talks to, owned by the application root.
#[derive(Clone)]
pub struct App {
    pub session: Arc<SessionStore>,
    pub lists: Arc<ListManager>,
    /// `None` when no catalog key is configured.
    pub metadata: Option<Arc<MetadataClient>>,
}

impl App {
    /// Bootstrap hook: wires the components and waits for the session to
    /// resolve, so nothing protected is served before the user is known.
    pub async fn start(
        backend: Arc<dyn Backend>,
        catalog: Option<Arc<dyn CatalogProvider>>,
        options: SessionOptions,
    ) -> Self {
        let session = Arc::new(SessionStore::new(Arc::clone(&backend), options));
        session.initialize().await;

        let lists = Arc::new(ListManager::new(backend, Arc::clone(&session)));
        let metadata = match catalog {
            Some(provider) => {
                info!(provider = provider.name(), "catalog enabled");
                Some(Arc::new(MetadataClient::new(provider)))
            }
            None => {
                warn!("TMDB_API_KEY not set, movie/TV browsing disabled");
                None
            }
        };

        Self {
            session,
            lists,
            metadata,
        }
    }
}
