//! Concurrent existence checks across candidate catalog repositories.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::ImageBackend;
use crate::{Error, Result};

/// Finds which candidate repositories publish a catalog for a tag.
#[derive(Clone)]
pub struct CandidateProber {
    backend: Arc<dyn ImageBackend>,
}

impl CandidateProber {
    /// Create a prober resolving identities through `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        Self { backend }
    }

    /// Probe `<candidate>:<version_tag>` for every candidate in parallel.
    ///
    /// A candidate is kept when its identity resolves. Results arrive in
    /// completion order; callers that need a stable order sort them.
    /// Returns only after every probe has finished.
    pub async fn probe(
        &self,
        candidates: &[String],
        version_tag: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if version_tag.is_empty() {
            return Err(Error::VersionRequired);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        for candidate in candidates {
            let image_ref = format!("{candidate}:{version_tag}");
            let backend = Arc::clone(&self.backend);
            let cancel = cancel.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!(image = %image_ref, "Probe cancelled");
                    }
                    result = backend.resolve_identity(&image_ref) => match result {
                        Ok(identity) => {
                            debug!(image = %image_ref, digest = %identity.digest, "Catalog exists");
                            let _ = tx.send(image_ref.clone());
                        }
                        Err(e) => {
                            debug!(image = %image_ref, error = %e, "Catalog not available");
                        }
                    },
                }
            });
        }
        drop(tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Probe task failed");
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled { stage: "catalog probe" });
        }

        let mut found = Vec::new();
        while let Some(image_ref) = rx.recv().await {
            found.push(image_ref);
        }

        if found.is_empty() {
            return Err(Error::NoCatalogsForVersion(version_tag.to_string()));
        }
        info!(
            version = version_tag,
            found = found.len(),
            probed = candidates.len(),
            "Probed catalog candidates"
        );
        Ok(found)
    }
}
