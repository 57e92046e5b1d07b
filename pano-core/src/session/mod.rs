//! Record of one panorama run: when it started, when it ended, what it shot.

use core::time::Duration;

use heapless::Vec;

use crate::actuator::camera::MediaName;
use crate::clock::MonotonicInstant;

/// Image names retained per session. Larger runs keep counting but drop names.
pub const MAX_SESSION_IMAGES: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanoramaSession<TInstant> {
    started_at: TInstant,
    finished_at: Option<TInstant>,
    images: Vec<MediaName, MAX_SESSION_IMAGES>,
    dropped: u16,
}

impl<TInstant> PanoramaSession<TInstant>
where
    TInstant: MonotonicInstant,
{
    #[must_use]
    pub const fn begin(started_at: TInstant) -> Self {
        Self {
            started_at,
            finished_at: None,
            images: Vec::new(),
            dropped: 0,
        }
    }

    /// Appends an image name. Ignored once the session is finished.
    pub fn record(&mut self, name: MediaName) {
        if self.is_finished() {
            log_warn!("session image after finish: {}", name.as_str());
            return;
        }
        if self.images.push(name).is_err() {
            self.dropped = self.dropped.saturating_add(1);
        }
    }

    /// Stamps the end time. Only the first call has an effect.
    pub fn finish(&mut self, finished_at: TInstant) {
        if self.finished_at.is_none() {
            self.finished_at = Some(finished_at);
        }
    }

    pub const fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub const fn started_at(&self) -> TInstant {
        self.started_at
    }

    pub const fn finished_at(&self) -> Option<TInstant> {
        self.finished_at
    }

    /// Image names in capture order.
    pub fn images(&self) -> &[MediaName] {
        &self.images
    }

    /// Images captured, including any whose names did not fit.
    pub fn image_count(&self) -> usize {
        self.images.len() + usize::from(self.dropped)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.finished_at
            .map(|end| end.saturating_duration_since(self.started_at))
    }
}
