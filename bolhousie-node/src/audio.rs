//! Audio cue probe: HTTP HEAD per catalog item. Anything but a success status means no audio.

use std::time::Duration;

use bolhousie_core::{AudioIndex, Catalog};
use tokio::task::JoinSet;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn audio_url(base: &str, item_id: &str) -> String {
    format!("{}/audio/{}.mp3", base.trim_end_matches('/'), item_id)
}

/// Probe every item concurrently. Without a base URL nothing has audio.
pub async fn probe(base: Option<&str>, catalog: &Catalog) -> AudioIndex {
    let Some(base) = base else {
        return AudioIndex::new();
    };
    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "audio probe disabled, http client failed to build");
            return AudioIndex::new();
        }
    };
    let mut probes = JoinSet::new();
    for item in catalog.items() {
        let client = client.clone();
        let url = audio_url(base, &item.id);
        let id = item.id.clone();
        probes.spawn(async move {
            let found = match client.head(&url).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(e) => {
                    tracing::debug!(%url, error = %e, "audio probe failed");
                    false
                }
            };
            (id, found)
        });
    }
    let mut index = AudioIndex::new();
    while let Some(joined) = probes.join_next().await {
        if let Ok((id, true)) = joined {
            index.insert(id);
        }
    }
    tracing::info!(with_audio = index.len(), total = catalog.len(), "audio probe done");
    index
}
