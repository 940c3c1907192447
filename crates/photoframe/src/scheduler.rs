//! Slideshow scheduler
//!
//! Two timed activities share one slide list:
//! - render: every `render_tick`, refresh the slide under the render cursor
//!   once its `refresh` interval has passed since the last attempt
//! - show: push the slide under the show cursor to the frame, then wait that
//!   slide's `show` time (or a short retry interval if it has no image yet)
//!
//! Both run as separate loops joined on one task by [`Scheduler::run`]. Each
//! loop runs its ticks strictly in sequence, so two displays never overlap,
//! while the other loop proceeds whenever one is suspended on the producer
//! or the transport. A tick replaces a slide's cached image as a whole, so
//! the show loop sees either the previous image or the new one.

use bytes::Bytes;
use common::{Diagnostic, DiagnosticSink};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// The scheduler's view of the picture frame
pub trait Transport {
    /// Whether a frame is open in custom mode. Must be side-effect free.
    fn is_available(&self) -> bool;

    /// Write one JPEG image to the frame, `false` on any failure
    fn display(&self, image: Bytes) -> impl Future<Output = bool> + Send;
}

/// Source of rendered slide images
pub trait ImageProducer {
    /// Render the slide at `index`, `None` on any acquisition failure
    fn render_screen(&self, index: usize) -> impl Future<Output = Option<Bytes>> + Send;
}

/// Tick intervals and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    pub render_tick: Duration,
    pub unavailable_backoff: Duration,
    pub retry_tick: Duration,
    pub show_retries: u32,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            render_tick: Duration::from_secs(1),
            unavailable_backoff: Duration::from_secs(5),
            retry_tick: Duration::from_secs(1),
            show_retries: 3,
        }
    }
}

/// Scheduling state of one configured screen
#[derive(Debug, Clone)]
pub struct SlideState {
    refresh: Duration,
    show: Duration,
    image: Option<Bytes>,
    rendered_at: Option<Instant>,
    attempted_at: Option<Instant>,
    retries_left: u32,
    max_retries: u32,
}

impl SlideState {
    pub fn new(refresh: Duration, show: Duration, retries: u32) -> Self {
        let max_retries = retries.max(1);
        Self {
            refresh,
            show,
            image: None,
            rendered_at: None,
            attempted_at: None,
            retries_left: max_retries,
            max_retries,
        }
    }

    pub fn refresh(&self) -> Duration {
        self.refresh
    }

    pub fn show(&self) -> Duration {
        self.show
    }

    /// Last successfully rendered image
    pub fn image(&self) -> Option<&Bytes> {
        self.image.as_ref()
    }

    pub fn rendered_at(&self) -> Option<Instant> {
        self.rendered_at
    }

    pub fn attempted_at(&self) -> Option<Instant> {
        self.attempted_at
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.attempted_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.refresh,
        }
    }

    fn reset_retries(&mut self) {
        self.retries_left = self.max_retries;
    }
}

/// Dual-loop slideshow over a [`Transport`] and an [`ImageProducer`]
///
/// Slides and cursors sit in `RefCell`/`Cell` so the two activities can
/// share them on one task. Borrows never span an `.await`: an image is
/// cloned out before a display and written back in one assignment after a
/// render.
pub struct Scheduler<T, P> {
    transport: T,
    producer: P,
    slides: RefCell<Vec<SlideState>>,
    timing: SchedulerTiming,
    sink: Arc<dyn DiagnosticSink>,
    render_cursor: Cell<usize>,
    show_cursor: Cell<usize>,
    unavailable: Cell<bool>,
}

impl<T: Transport, P: ImageProducer> Scheduler<T, P> {
    pub fn new(
        transport: T,
        producer: P,
        slides: Vec<SlideState>,
        timing: SchedulerTiming,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        if slides.is_empty() {
            warn!("No slides configured, slideshow will stay idle");
        }

        Self {
            transport,
            producer,
            slides: RefCell::new(slides),
            timing,
            sink,
            render_cursor: Cell::new(0),
            show_cursor: Cell::new(0),
            unavailable: Cell::new(false),
        }
    }

    pub fn render_cursor(&self) -> usize {
        self.render_cursor.get()
    }

    pub fn show_cursor(&self) -> usize {
        self.show_cursor.get()
    }

    /// Snapshot of every slide's state
    pub fn slides(&self) -> Vec<SlideState> {
        self.slides.borrow().clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timing(&self) -> SchedulerTiming {
        self.timing
    }

    fn slide_count(&self) -> usize {
        self.slides.borrow().len()
    }

    /// One tick of the render activity
    pub async fn render_tick(&self, now: Instant) {
        let count = self.slide_count();
        if count == 0 {
            return;
        }

        if !self.check_available() {
            self.render_cursor.set(0);
            return;
        }

        let index = self.render_cursor.get();
        let due = {
            let mut slides = self.slides.borrow_mut();
            let slide = &mut slides[index];
            // Gate on the attempt so a failing source is not retried early
            if slide.is_due(now) {
                slide.attempted_at = Some(now);
                true
            } else {
                false
            }
        };

        if due {
            match self.producer.render_screen(index).await {
                Some(image) => {
                    let image_len = image.len();
                    {
                        let mut slides = self.slides.borrow_mut();
                        let slide = &mut slides[index];
                        slide.image = Some(image);
                        slide.rendered_at = Some(now);
                    }
                    self.sink.emit(Diagnostic::SlideRendered {
                        slide: index,
                        image_len,
                    });
                }
                None => self.sink.emit(Diagnostic::RenderFailed { slide: index }),
            }
        }

        self.render_cursor.set((index + 1) % count);
    }

    /// One tick of the show activity, returning the delay until the next one
    pub async fn show_tick(&self) -> Duration {
        let count = self.slide_count();
        if count == 0 {
            return self.timing.unavailable_backoff;
        }

        if !self.check_available() {
            self.show_cursor.set(0);
            return self.timing.unavailable_backoff;
        }

        let index = self.show_cursor.get();
        let next = (index + 1) % count;
        let (image, show) = {
            let slides = self.slides.borrow();
            (slides[index].image.clone(), slides[index].show)
        };

        match image {
            Some(image) => {
                if self.transport.display(image).await {
                    self.slides.borrow_mut()[index].reset_retries();
                } else {
                    debug!("Slide {} was not displayed", index);
                }
                self.show_cursor.set(next);
                show
            }
            None => {
                let skipped = {
                    let mut slides = self.slides.borrow_mut();
                    let slide = &mut slides[index];
                    slide.retries_left = slide.retries_left.saturating_sub(1);
                    if slide.retries_left == 0 {
                        slide.reset_retries();
                        true
                    } else {
                        false
                    }
                };
                if skipped {
                    self.show_cursor.set(next);
                    self.sink.emit(Diagnostic::SlideSkipped { slide: index });
                }
                self.timing.retry_tick
            }
        }
    }

    /// Drive both activities until the future is dropped
    ///
    /// The activities interleave only while one of them waits on a render
    /// or a display, so a slow source never delays the show pacing.
    pub async fn run(&self) {
        info!("Starting slideshow with {} slides", self.slide_count());
        tokio::join!(self.render_loop(), self.show_loop());
    }

    async fn render_loop(&self) {
        let mut render_at = Instant::now();
        loop {
            sleep_until(render_at).await;
            self.render_tick(Instant::now()).await;
            render_at = Instant::now() + self.timing.render_tick;
        }
    }

    async fn show_loop(&self) {
        let mut show_at = Instant::now() + self.timing.retry_tick;
        loop {
            sleep_until(show_at).await;
            let delay = self.show_tick().await;
            show_at = Instant::now() + delay;
        }
    }

    /// Query the transport, reporting the transition to unavailable once
    fn check_available(&self) -> bool {
        let available = self.transport.is_available();
        if !available && !self.unavailable.get() {
            self.sink.emit(Diagnostic::TransportUnavailable);
        }
        self.unavailable.set(!available);
        available
    }
}
