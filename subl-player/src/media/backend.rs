//! Resource fetching and decode check
//!
//! [`ClockBackend`] fetches a resource (local file or HTTP), probes it with
//! symphonia to confirm there is a decodable audio track and to read its
//! duration, then hands back a [`ClockMedia`] for transport.

use super::{ClockMedia, MediaBackend, MediaHandle, MediaSlot, MediaSource, NoticeSender};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Fetches and validates resources, producing clock-driven handles
pub struct ClockBackend {
    client: reqwest::Client,
}

impl ClockBackend {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::load(url, e))?;
            if !response.status().is_success() {
                return Err(Error::load(url, format!("HTTP {}", response.status())));
            }
            let bytes = response.bytes().await.map_err(|e| Error::load(url, e))?;
            Ok(bytes.to_vec())
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            tokio::fs::read(path).await.map_err(|e| Error::load(url, e))
        }
    }
}

#[async_trait]
impl MediaBackend for ClockBackend {
    async fn load(
        &self,
        source: MediaSource,
        slot: MediaSlot,
        notices: NoticeSender,
    ) -> Result<Box<dyn MediaHandle>> {
        let label = source.label().to_string();
        debug!(?slot, "Loading {}", label);

        let (data, hint) = match source {
            MediaSource::Url(url) => {
                let data = self.fetch(&url).await?;
                (data, extension_hint(&url))
            }
            MediaSource::Bytes { data, .. } => (data, None),
        };

        if data.is_empty() {
            return Err(Error::load(&label, "empty resource"));
        }

        let duration = probe_duration(data, hint)
            .await
            .map_err(|e| Error::load(&label, e))?;

        info!(?slot, "Loaded {} ({:.2}s)", label, duration);
        Ok(Box::new(ClockMedia::new(slot, label, duration, notices)))
    }
}

/// File extension of a URL path, ignoring query and fragment
fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Probe encoded audio and return its duration in seconds
///
/// Fails when no supported audio track is found or no decoder exists for it.
/// Runs on the blocking pool.
pub async fn probe_duration(data: Vec<u8>, extension: Option<String>) -> std::result::Result<f64, String> {
    tokio::task::spawn_blocking(move || probe_blocking(data, extension.as_deref()))
        .await
        .map_err(|e| format!("probe task failed: {}", e))?
}

fn probe_blocking(data: Vec<u8>, extension: Option<&str>) -> std::result::Result<f64, String> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Failed to probe format: {}", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "No audio track found".to_string())?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| format!("Unsupported codec: {}", e))?;

    if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
        if rate > 0 {
            return Ok(frames as f64 / rate as f64);
        }
    }

    // No frame count in the container header; walk the packets
    let mut total_ts: u64 = 0;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => total_ts += packet.dur,
            Ok(_) => {}
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => {
                warn!("Error reading packet while probing: {}", e);
                break;
            }
        }
    }

    let seconds = match (params.time_base, params.sample_rate) {
        (Some(tb), _) => {
            let time = tb.calc_time(total_ts);
            time.seconds as f64 + time.frac
        }
        (None, Some(rate)) if rate > 0 => total_ts as f64 / rate as f64,
        _ => return Err("Cannot determine duration".to_string()),
    };

    if seconds <= 0.0 {
        return Err("No playable audio".to_string());
    }
    Ok(seconds)
}
