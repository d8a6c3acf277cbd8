//! The processor module tags a single file end to end: identify it, fetch its release, reconcile
//! its tags, and queue its album for a media-index refresh if anything changed.
use crate::audiotags::extract_release_identifiers;
use crate::catalog::CatalogClient;
use crate::config::{ArtistCreditPolicy, Config};
use crate::error::{AutotagExpectedError, Result};
use crate::filetags::FileTags;
use crate::inventory::InventoryResolver;
use crate::mediaindex::{RefreshNotifier, RefreshSet};
use crate::ratelimit::RateLimiter;
use crate::tagwriter::{TagWriter, WriteOutcome};
use crate::tools::SystemCommandRunner;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TrackProcessor {
    catalog: CatalogClient,
    inventory: Option<InventoryResolver>,
    notifier: Option<RefreshNotifier>,
    writer: TagWriter,
    policy: ArtistCreditPolicy,
}

impl TrackProcessor {
    pub fn new(catalog: CatalogClient, inventory: Option<InventoryResolver>, notifier: Option<RefreshNotifier>, writer: TagWriter, policy: ArtistCreditPolicy) -> Self {
        Self {
            catalog,
            inventory,
            notifier,
            writer,
            policy,
        }
    }

    pub fn from_config(c: &Config) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(c.catalog.rate_limit));
        Ok(Self::new(
            CatalogClient::from_config(c, limiter)?,
            InventoryResolver::from_config(c)?,
            RefreshNotifier::from_config(c)?,
            TagWriter::new(Arc::new(SystemCommandRunner), &c.tools),
            c.artist_credit.clone(),
        ))
    }

    pub fn notifier(&self) -> Option<&RefreshNotifier> {
        self.notifier.as_ref()
    }

    pub fn process(&self, p: &Path, library_root: &Path, refresh: &mut RefreshSet) -> Result<WriteOutcome> {
        let mut ids = extract_release_identifiers(p)?;
        if !ids.is_complete() {
            if let Some(inventory) = &self.inventory {
                debug!(path = %p.display(), "embedded identifiers incomplete, asking inventory");
                ids = inventory.resolve(p, library_root)?;
            }
        }
        if !ids.is_complete() {
            return Err(AutotagExpectedError::IdentifiersUnavailable { path: p.to_path_buf() }.into());
        }
        let release_id = ids.release_id.trim();
        let track_id = ids.track_id.trim();

        let release = self.catalog.fetch_release(release_id)?;
        let loc = release.find_track(track_id).ok_or_else(|| AutotagExpectedError::TrackNotFound {
            track_id: track_id.to_string(),
            release_id: release_id.to_string(),
        })?;
        let tags = FileTags::from_catalog(&release, &loc, &self.policy)?;

        let outcome = self.writer.sync(p, &tags)?;

        if !outcome.unchanged {
            if let Some(notifier) = &self.notifier {
                let album = tags.album.as_deref().unwrap_or_default();
                let release_artist = tags.album_artist.as_deref().unwrap_or_default();
                let title = tags.title.as_deref().unwrap_or_default();
                if let Err(e) = notifier.note_change(album, release_artist, title, outcome.unchanged, outcome.tags_written, refresh) {
                    warn!(path = %p.display(), album, "media index refresh not queued: {e}");
                }
            }
        }
        Ok(outcome)
    }
}
