//! The session tracker: which video is being watched, and when to save it.
//!
//! The host feeds it page events (mutations, navigations, media events,
//! frame messages) and calls [`SessionTracker::tick`] on a clock. Time is
//! always passed in as milliseconds, so every debounce and retry is
//! deterministic under test.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, trace, warn};
use url::Url;

use tsuzuki_core::config::AppConfig;
use tsuzuki_core::debug_log::{DetachReason, EventLog, SessionEvent};
use tsuzuki_core::identity::{content_key_for, metadata_signature};
use tsuzuki_core::messages::{
    FrameMessage, GetProgressResponse, ParentInfo, SaveProgressRequest, SaveProgressResponse,
};
use tsuzuki_core::models::PlaybackMetadata;
use tsuzuki_core::progress::should_offer_resume;
use tsuzuki_detect::{
    CandidateSelector, Dom, DomError, MediaEvent, NodeId, PageContext, Scanner, SourceStrategy,
    StrategyRegistry,
};

use crate::channel::ProgressChannel;
use crate::composer::MetadataComposer;
use crate::frame::{FrameBridge, FrameTarget, NoFrames};
use crate::timers::{TimerKind, TimerQueue};

/// Where the tracker stands with respect to the page's video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Unattached,
    /// A navigation happened and re-detection is waiting for the page to
    /// settle.
    PendingReattach,
    Attached(NodeId),
}

/// Stored progress the user may want to jump back to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeOffer {
    pub content_key: String,
    pub url: String,
    pub title: String,
    pub resume_at: f64,
    pub duration: f64,
    pub percent_complete: f64,
}

/// Mutable state of the current viewing session.
#[derive(Debug, Default)]
struct Session {
    attached: Option<NodeId>,
    last_saved_time: Option<f64>,
    /// Clock reading of the last save, or of the attach that started the
    /// session.
    last_save_at: Option<u64>,
    last_video_source: Option<String>,
    last_signature: Option<String>,
    attempts: u32,
    /// Failed passes schedule another one until the attempt budget runs out.
    retrying: bool,
}

struct PendingSave {
    content_key: String,
    current_time: f64,
    reply: oneshot::Receiver<SaveProgressResponse>,
}

pub struct SessionTracker<'a, C> {
    dom: &'a dyn Dom,
    registry: StrategyRegistry,
    channel: C,
    frames: Box<dyn FrameBridge + 'a>,
    config: AppConfig,
    timers: TimerQueue,
    session: Session,
    strategy: Option<Box<dyn SourceStrategy>>,
    strategy_resolved: bool,
    composer: MetadataComposer,
    page_url: String,
    pending_lookup: Option<oneshot::Receiver<GetProgressResponse>>,
    pending_saves: Vec<PendingSave>,
    offers: Vec<ResumeOffer>,
    store_lost: bool,
    log: EventLog,
}

impl<'a, C: ProgressChannel> SessionTracker<'a, C> {
    pub fn new(dom: &'a dyn Dom, registry: StrategyRegistry, channel: C, config: AppConfig) -> Self {
        Self {
            dom,
            registry,
            channel,
            frames: Box::new(NoFrames),
            config,
            timers: TimerQueue::new(),
            session: Session::default(),
            strategy: None,
            strategy_resolved: false,
            composer: MetadataComposer::new(),
            page_url: String::new(),
            pending_lookup: None,
            pending_saves: Vec::new(),
            offers: Vec::new(),
            store_lost: false,
            log: EventLog::new(),
        }
    }

    pub fn with_frame_bridge(mut self, bridge: impl FrameBridge + 'a) -> Self {
        self.frames = Box::new(bridge);
        self
    }

    /// First detection pass. Inside an embedded frame, also ask the parent
    /// page what is playing.
    pub fn start(&mut self, now: u64) {
        self.page_url = self.dom.location();
        info!(url = %self.page_url, embedded = self.is_embedded(), "Tracking page");
        if self.is_embedded() {
            self.frames.post(FrameTarget::Parent, &FrameMessage::RequestInfo);
        }
        self.session.attempts = 0;
        self.session.retrying = true;
        self.detect(now);
    }

    /// Let go of the video and every timer.
    pub fn stop(&mut self, now: u64) {
        self.detach(now, DetachReason::Stopped);
        self.timers.cancel_all();
        self.pending_lookup = None;
    }

    /// The page's DOM changed.
    pub fn on_mutation(&mut self, now: u64) {
        match self.session.attached {
            Some(el) if self.dom.is_connected(el) => return,
            Some(_) => self.detach(now, DetachReason::Removed),
            None => {}
        }
        if self.timers.is_pending(TimerKind::NavigationDetect) {
            return;
        }
        // A mutation opens a fresh attempt run unless one is still going.
        if !self.session.retrying {
            self.session.attempts = 0;
            self.session.retrying = true;
        }
        self.timers.schedule(
            TimerKind::Detect,
            now + self.config.detection.mutation_debounce_ms,
        );
    }

    /// The page changed URL without reloading.
    pub fn on_navigation(&mut self, now: u64, url: &str) {
        if url == self.page_url {
            return;
        }
        info!(from = %self.page_url, to = %url, "Navigation");
        self.page_url = url.to_string();

        self.detach(now, DetachReason::Navigation);
        self.timers.cancel_all();
        self.strategy = None;
        self.strategy_resolved = false;
        self.composer.reset_for_navigation();
        self.pending_lookup = None;
        self.session = Session {
            retrying: true,
            ..Session::default()
        };

        let nav = &self.config.navigation;
        self.timers
            .schedule(TimerKind::NavigationDetect, now + nav.detect_debounce_ms);
        self.timers
            .schedule(TimerKind::ResumeCheck, now + nav.resume_debounce_ms);

        if self.is_embedded() {
            self.frames.post(FrameTarget::Parent, &FrameMessage::RequestInfo);
        }
        self.push_event(now, SessionEvent::Navigated { url: url.to_string() });
    }

    /// A media event fired on `element`.
    pub fn on_media_event(&mut self, now: u64, element: NodeId, event: MediaEvent) {
        if self.session.attached != Some(element) {
            trace!(element = ?element, event = event.as_str(), "Event from untracked element");
            return;
        }
        match event {
            MediaEvent::Play => {
                if self.store_available(now) {
                    self.timers
                        .schedule(TimerKind::PeriodicSave, now + self.config.save.interval_ms);
                }
            }
            MediaEvent::Pause | MediaEvent::Ended => {
                self.timers.cancel(TimerKind::PeriodicSave);
                self.save(now);
            }
            MediaEvent::TimeUpdate => {
                let threshold = self.config.save.timeupdate_threshold_ms;
                let due = self
                    .session
                    .last_save_at
                    .is_none_or(|at| now.saturating_sub(at) > threshold);
                if due {
                    self.save(now);
                }
            }
            MediaEvent::LoadedMetadata | MediaEvent::DurationChange => {
                let source = self.dom.media(element).and_then(|m| m.current_src);
                if source != self.session.last_video_source {
                    debug!(element = ?element, source = ?source, "Source swapped in place");
                    self.session.last_video_source = source;
                    self.session.last_saved_time = None;
                    self.session.last_save_at = Some(now);
                }
                self.timers.schedule(
                    TimerKind::ResumeCheck,
                    now + self.config.resume.metadata_debounce_ms,
                );
            }
            MediaEvent::Emptied => {
                debug!(element = ?element, "Media emptied");
            }
        }
    }

    /// A message posted from another frame.
    pub fn on_frame_message(&mut self, now: u64, raw: &serde_json::Value) {
        let Some(message) = FrameMessage::parse(raw) else {
            return;
        };
        match message {
            FrameMessage::RequestInfo => {
                if self.is_embedded() {
                    return;
                }
                if let Some(info) = self.describe_page() {
                    debug!(title = %info.title, "Answering frame info request");
                    self.frames
                        .post(FrameTarget::Source, &FrameMessage::ParentInfo(info));
                }
            }
            FrameMessage::ParentInfo(info) => {
                if !self.is_embedded() {
                    return;
                }
                self.push_event(
                    now,
                    SessionEvent::ParentInfoReceived {
                        title: info.title.clone(),
                    },
                );
                if self.composer.set_parent_info(info) && self.session.attached.is_some() {
                    self.timers.schedule(
                        TimerKind::ResumeCheck,
                        now + self.config.resume.metadata_debounce_ms,
                    );
                }
            }
        }
    }

    /// Fire due timers and collect replies from the store.
    pub fn tick(&mut self, now: u64) {
        for kind in self.timers.pop_due(now) {
            match kind {
                TimerKind::Detect | TimerKind::NavigationDetect => self.detect(now),
                TimerKind::ResumeCheck => self.resume_check(now),
                TimerKind::PeriodicSave => {
                    self.save(now);
                    self.reschedule_periodic(now);
                }
            }
        }
        self.poll_replies(now);
    }

    /// Resume offers collected since the last call.
    pub fn take_resume_offers(&mut self) -> Vec<ResumeOffer> {
        std::mem::take(&mut self.offers)
    }

    /// Seek the attached video, e.g. after the user accepted a resume offer.
    pub fn seek_to(&mut self, seconds: f64) -> Result<(), DomError> {
        let element = self
            .session
            .attached
            .ok_or_else(|| DomError::Query("no video attached".into()))?;
        self.dom.seek(element, seconds)
    }

    pub fn state(&self) -> TrackerState {
        match self.session.attached {
            Some(el) => TrackerState::Attached(el),
            None if self.timers.is_pending(TimerKind::NavigationDetect) => {
                TrackerState::PendingReattach
            }
            None => TrackerState::Unattached,
        }
    }

    pub fn events(&self) -> &EventLog {
        &self.log
    }

    /// When the host should call [`Self::tick`] next.
    pub fn next_wakeup(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    pub fn strategy_name(&self) -> Option<&str> {
        self.strategy.as_deref().map(|s| s.platform_name())
    }

    fn is_embedded(&self) -> bool {
        !self.dom.is_top_level()
    }

    fn page_location(&self) -> Option<Url> {
        let location = self.dom.location();
        match Url::parse(&location) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!(location = %location, error = %e, "Unparseable page URL");
                None
            }
        }
    }

    fn resolve_strategy(&mut self, host: &str) {
        if self.strategy_resolved {
            return;
        }
        self.strategy = self.registry.select(host);
        self.strategy_resolved = true;
        match &self.strategy {
            Some(s) => debug!(host, platform = s.platform_name(), "Using strategy"),
            None => debug!(host, "No strategy, using generic extraction"),
        }
    }

    fn detect(&mut self, now: u64) {
        if let Some(el) = self.session.attached {
            if self.dom.is_connected(el) {
                return;
            }
            self.detach(now, DetachReason::Removed);
        }

        let attached = match self.find_video() {
            Some(node) => self.attach(now, node),
            None => false,
        };
        if !attached {
            self.detect_failed(now);
        }
    }

    /// Scanner, strategy filter and selector in one pass.
    fn find_video(&mut self) -> Option<NodeId> {
        let url = self.page_location()?;
        self.resolve_strategy(url.host_str().unwrap_or_default());

        let dom = self.dom;
        let ctx = PageContext::new(dom, &url);
        let strategy = self.strategy.as_deref();
        if let Some(s) = strategy {
            if !s.is_valid_playback_page(&ctx) {
                debug!(platform = s.platform_name(), url = %url, "Not a playback page");
                return None;
            }
        }

        let videos = Scanner::new(dom).find_all_videos();
        if videos.is_empty() {
            return None;
        }
        CandidateSelector::new(&ctx, &self.config.selector)
            .with_content_type(strategy.and_then(|s| s.content_type(&ctx)))
            .select(&ctx, strategy, videos)
    }

    fn detect_failed(&mut self, now: u64) {
        self.session.attempts += 1;
        let attempt = self.session.attempts;
        self.push_event(now, SessionEvent::DetectFailed { attempt });

        if !self.session.retrying {
            return;
        }
        if attempt < self.config.detection.max_attempts {
            self.timers.schedule(
                TimerKind::Detect,
                now + self.config.detection.retry_delay_ms,
            );
        } else {
            self.session.retrying = false;
            debug!(attempts = attempt, "No video found, giving up");
            self.push_event(now, SessionEvent::DetectExhausted { attempts: attempt });
        }
    }

    fn attach(&mut self, now: u64, element: NodeId) -> bool {
        if let Err(e) = self.dom.listen(element, &MediaEvent::ALL) {
            warn!(element = ?element, error = %e, "Could not listen to video");
            return false;
        }

        let media = self.dom.media(element);
        self.session.attached = Some(element);
        self.session.attempts = 0;
        self.session.retrying = false;
        self.session.last_save_at = Some(now);
        self.session.last_video_source = media.as_ref().and_then(|m| m.current_src.clone());
        self.timers.cancel(TimerKind::Detect);
        self.timers.cancel(TimerKind::NavigationDetect);
        self.composer.reset_for_attach();

        let delay = if self.is_embedded() {
            self.config.resume.embedded_delay_ms
        } else {
            self.config.resume.initial_delay_ms
        };
        self.timers.schedule(TimerKind::ResumeCheck, now + delay);
        if media.is_some_and(|m| !m.paused) {
            self.timers
                .schedule(TimerKind::PeriodicSave, now + self.config.save.interval_ms);
        }

        let strategy = self.strategy_name().map(str::to_string);
        info!(element = ?element, strategy = ?strategy, "Attached to video");
        self.push_event(
            now,
            SessionEvent::Attached {
                element: element.0,
                strategy,
            },
        );
        true
    }

    fn detach(&mut self, now: u64, reason: DetachReason) {
        let Some(element) = self.session.attached.take() else {
            return;
        };
        if let Err(e) = self.dom.unlisten(element, &MediaEvent::ALL) {
            debug!(element = ?element, error = %e, "Listener removal failed");
        }
        self.timers.cancel_all();
        self.session.last_video_source = None;
        self.session.last_saved_time = None;
        self.session.last_signature = None;
        info!(element = ?element, ?reason, "Detached from video");
        self.push_event(now, SessionEvent::Detached { reason });
    }

    fn compose(&mut self) -> Option<PlaybackMetadata> {
        let url = self.page_location()?;
        self.resolve_strategy(url.host_str().unwrap_or_default());
        let ctx = PageContext::new(self.dom, &url);
        Some(self.composer.compose(&ctx, self.strategy.as_deref()))
    }

    /// What this (top-level) page is showing, for an embedded frame.
    fn describe_page(&mut self) -> Option<ParentInfo> {
        let meta = self.compose()?;
        let mut info = ParentInfo::from_metadata(&meta);
        let dom = self.dom;
        info.canonical_url = Scanner::new(dom).find_first_match(&["link[rel='canonical']"], |el| {
            dom.attribute(el, "href").filter(|h| !h.trim().is_empty())
        });
        Some(info)
    }

    /// Checked before every store round-trip. Losing the store also stops
    /// the periodic save.
    fn store_available(&mut self, now: u64) -> bool {
        if self.channel.is_connected() {
            self.store_lost = false;
            return true;
        }
        self.timers.cancel(TimerKind::PeriodicSave);
        if !self.store_lost {
            self.store_lost = true;
            warn!("Progress store unavailable, saves suspended");
            self.push_event(
                now,
                SessionEvent::Error {
                    source: "store".into(),
                    message: "progress store unavailable".into(),
                },
            );
        }
        false
    }

    fn save(&mut self, now: u64) {
        let Some(element) = self.session.attached else {
            return;
        };
        if !self.store_available(now) {
            return;
        }
        let Some(media) = self.dom.media(element) else {
            return;
        };
        let Some(duration) = media.known_duration() else {
            debug!(element = ?element, "Duration unknown, not saving");
            return;
        };
        if !media.current_time.is_finite() || self.session.last_saved_time == Some(media.current_time) {
            return;
        }
        let Some(metadata) = self.compose() else {
            return;
        };

        let signature = metadata_signature(&metadata);
        let changed = self
            .session
            .last_signature
            .as_ref()
            .is_some_and(|prev| *prev != signature);
        self.session.last_signature = Some(signature.clone());
        if changed {
            // New content in a reused element: look for its saved position
            // before the first write overwrites it.
            info!(title = %metadata.title, "Content changed in place");
            self.session.last_save_at = Some(now);
            self.timers.schedule(
                TimerKind::ResumeCheck,
                now + self.config.resume.metadata_debounce_ms,
            );
            self.push_event(now, SessionEvent::ContentChanged { signature });
            return;
        }

        let content_key = content_key_for(&metadata);
        debug!(key = %content_key, time = media.current_time, "Saving progress");
        let reply = self.channel.save_progress(SaveProgressRequest {
            metadata,
            current_time: media.current_time,
            duration,
        });
        self.pending_saves.push(PendingSave {
            content_key,
            current_time: media.current_time,
            reply,
        });
        self.session.last_saved_time = Some(media.current_time);
        self.session.last_save_at = Some(now);
    }

    fn reschedule_periodic(&mut self, now: u64) {
        let Some(element) = self.session.attached else {
            return;
        };
        let playing = self.dom.media(element).is_some_and(|m| !m.paused);
        if playing && !self.store_lost {
            self.timers
                .schedule(TimerKind::PeriodicSave, now + self.config.save.interval_ms);
        }
    }

    fn resume_check(&mut self, now: u64) {
        if !self.store_available(now) {
            return;
        }
        let Some(url) = self.page_location() else {
            return;
        };
        let lookup_url = self.composer.content_url(&PageContext::new(self.dom, &url));
        debug!(url = %lookup_url, "Looking up saved progress");
        self.pending_lookup = Some(self.channel.get_progress(&lookup_url));
    }

    fn poll_replies(&mut self, now: u64) {
        if let Some(rx) = self.pending_lookup.as_mut() {
            match rx.try_recv() {
                Ok(response) => {
                    self.pending_lookup = None;
                    self.consider_resume(now, response);
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => {
                    debug!("Progress lookup got no reply");
                    self.pending_lookup = None;
                }
            }
        }

        let mut finished = Vec::new();
        self.pending_saves.retain_mut(|pending| match pending.reply.try_recv() {
            Ok(response) => {
                finished.push((pending.content_key.clone(), pending.current_time, Some(response)));
                false
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Closed) => {
                finished.push((pending.content_key.clone(), pending.current_time, None));
                false
            }
        });

        for (content_key, current_time, response) in finished {
            match response {
                Some(r) if r.success => {
                    self.push_event(now, SessionEvent::Saved { content_key, current_time });
                }
                Some(r) => {
                    let message = r.error.unwrap_or_default();
                    warn!(key = %content_key, error = %message, "Save rejected by store");
                    self.push_event(
                        now,
                        SessionEvent::Error {
                            source: "save".into(),
                            message,
                        },
                    );
                }
                None => debug!(key = %content_key, "Save got no reply"),
            }
        }
    }

    fn consider_resume(&mut self, now: u64, response: GetProgressResponse) {
        if !response.success {
            return;
        }
        let Some(record) = response.data else {
            debug!("No saved progress for page");
            return;
        };
        if !should_offer_resume(&record, &self.config.resume) {
            debug!(
                key = %record.content_key,
                time = record.current_time,
                percent = record.percent_complete,
                "Saved progress not worth resuming"
            );
            return;
        }

        info!(key = %record.content_key, time = record.current_time, "Offering resume");
        self.push_event(
            now,
            SessionEvent::ResumeOffered {
                content_key: record.content_key.clone(),
                resume_at: record.current_time,
            },
        );
        self.offers.retain(|o| o.content_key != record.content_key);
        self.offers.push(ResumeOffer {
            content_key: record.content_key,
            url: record.url,
            title: record.title,
            resume_at: record.current_time,
            duration: record.duration,
            percent_complete: record.percent_complete,
        });
    }

    fn push_event(&mut self, now: u64, event: SessionEvent) {
        let at = i64::try_from(now)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default();
        self.log.push(at, event);
    }
}
