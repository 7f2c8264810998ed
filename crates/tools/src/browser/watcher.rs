//! Bounded waits for page transitions.

use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use webrover_core::config::BrowserConfig;
use webrover_core::Result;

use super::driver::{DocumentResponse, LifecycleEvent, PageDriver};

/// Page lifecycle state, updated only from drained driver events.
#[derive(Debug, Clone, Default)]
pub struct LifecycleFlags {
    pub load_fired: bool,
    pub navigating: bool,
    pub download: bool,
    in_flight: HashSet<String>,
}

impl LifecycleFlags {
    pub fn in_flight_requests(&self) -> usize {
        self.in_flight.len()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, event: &LifecycleEvent, download_size_threshold: u64) {
        match event {
            LifecycleEvent::LoadFired => {
                self.load_fired = true;
                self.navigating = false;
            }
            LifecycleEvent::NavigationStarted => {
                self.navigating = true;
                self.load_fired = false;
            }
            LifecycleEvent::NavigationStopped => self.navigating = false,
            LifecycleEvent::RequestStarted(id) => {
                self.in_flight.insert(id.clone());
            }
            LifecycleEvent::RequestFinished(id) => {
                self.in_flight.remove(id);
            }
            LifecycleEvent::Response(response) => {
                if is_download_response(response, download_size_threshold) {
                    self.download = true;
                }
            }
            LifecycleEvent::DownloadStarted => self.download = true,
        }
    }
}

/// Attachment disposition, oversized body, or an octet-stream type.
pub fn is_download_response(response: &DocumentResponse, size_threshold: u64) -> bool {
    let attachment = response
        .content_disposition
        .as_deref()
        .map(|v| v.to_ascii_lowercase().contains("attachment"))
        .unwrap_or(false);
    let oversized = response.content_length.map(|len| len > size_threshold).unwrap_or(false);
    let octet_stream = response
        .content_type
        .as_deref()
        .map(|v| v.trim().to_ascii_lowercase().starts_with("application/octet-stream"))
        .unwrap_or(false);
    attachment || oversized || octet_stream
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Loaded,
    Download,
    TimedOut,
}

impl Settlement {
    /// `false` means no page transition happened within the timeout.
    pub fn is_settled(self) -> bool {
        !matches!(self, Settlement::TimedOut)
    }
}

pub struct NavigationWatcher {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub settle_delay: Duration,
    pub download_size_threshold: u64,
}

impl NavigationWatcher {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            timeout: Duration::from_millis(config.navigation_timeout_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            download_size_threshold: config.download_size_threshold,
        }
    }

    /// Drop events that predate the action about to be triggered.
    pub async fn arm(&self, driver: &mut dyn PageDriver, flags: &mut LifecycleFlags) -> Result<()> {
        let stale = driver.drain_lifecycle().await?;
        if !stale.is_empty() {
            debug!(count = stale.len(), "Discarded stale lifecycle events");
        }
        flags.reset();
        Ok(())
    }

    /// Poll until the page loads, a download is detected, or `timeout` elapses.
    pub async fn await_settled(
        &self,
        driver: &mut dyn PageDriver,
        flags: &mut LifecycleFlags,
        timeout: Duration,
    ) -> Result<Settlement> {
        let started = Instant::now();
        loop {
            for event in driver.drain_lifecycle().await? {
                flags.apply(&event, self.download_size_threshold);
            }

            if flags.download {
                info!("Download detected, not waiting for navigation");
                return Ok(Settlement::Download);
            }
            if flags.load_fired {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Navigation settled");
                return Ok(Settlement::Loaded);
            }
            if started.elapsed() >= timeout {
                info!(
                    timeout_ms = timeout.as_millis() as u64,
                    navigating = flags.navigating,
                    in_flight = flags.in_flight_requests(),
                    "Navigation did not settle"
                );
                return Ok(Settlement::TimedOut);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// [`await_settled`](Self::await_settled) with the configured timeout,
    /// followed by the settle delay when a page loaded.
    pub async fn settle(&self, driver: &mut dyn PageDriver, flags: &mut LifecycleFlags) -> Result<Settlement> {
        let settlement = self.await_settled(driver, flags, self.timeout).await?;
        if settlement == Settlement::Loaded && !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(settlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::driver::{ElementProbe, NavigateOutcome};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use webrover_core::config::FocusStrategy;

    /// Hands out one batch of events per drain.
    struct ScriptedEvents {
        batches: VecDeque<Vec<LifecycleEvent>>,
    }

    #[async_trait]
    impl PageDriver for ScriptedEvents {
        async fn navigate(&mut self, _url: &str) -> Result<NavigateOutcome> {
            Ok(NavigateOutcome::Started)
        }
        async fn current_url(&mut self) -> Result<String> {
            Ok(String::new())
        }
        async fn body_html(&mut self) -> Result<String> {
            Ok(String::new())
        }
        async fn begin_traversal(&mut self, _selector: &str, _strategy: FocusStrategy) -> Result<()> {
            Ok(())
        }
        async fn focus_next(&mut self) -> Result<Option<ElementProbe>> {
            Ok(None)
        }
        async fn assign_id(&mut self, _handle: &str, _id: u32) -> Result<()> {
            Ok(())
        }
        async fn click(&mut self, _handle: &str) -> Result<()> {
            Ok(())
        }
        async fn type_into(&mut self, _handle: &str, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn submit_form(&mut self, _handle: &str) -> Result<()> {
            Ok(())
        }
        async fn drain_lifecycle(&mut self) -> Result<Vec<LifecycleEvent>> {
            Ok(self.batches.pop_front().unwrap_or_default())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn watcher() -> NavigationWatcher {
        NavigationWatcher {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
            settle_delay: Duration::ZERO,
            download_size_threshold: 10 * 1024 * 1024,
        }
    }

    #[test]
    fn test_download_detection() {
        let threshold = 100;
        assert!(is_download_response(
            &DocumentResponse { content_disposition: Some("Attachment; filename=x".into()), ..Default::default() },
            threshold
        ));
        assert!(is_download_response(
            &DocumentResponse { content_length: Some(101), ..Default::default() },
            threshold
        ));
        assert!(is_download_response(
            &DocumentResponse { content_type: Some("application/octet-stream".into()), ..Default::default() },
            threshold
        ));
        assert!(!is_download_response(
            &DocumentResponse {
                content_type: Some("text/html; charset=utf-8".into()),
                content_length: Some(100),
                content_disposition: Some("inline".into()),
            },
            threshold
        ));
    }

    #[test]
    fn test_flags_track_requests() {
        let mut flags = LifecycleFlags::default();
        flags.apply(&LifecycleEvent::RequestStarted("1".into()), 0);
        flags.apply(&LifecycleEvent::RequestStarted("1".into()), 0);
        flags.apply(&LifecycleEvent::RequestStarted("2".into()), 0);
        assert_eq!(flags.in_flight_requests(), 2);
        flags.apply(&LifecycleEvent::RequestFinished("1".into()), 0);
        flags.apply(&LifecycleEvent::RequestFinished("9".into()), 0);
        assert_eq!(flags.in_flight_requests(), 1);
    }

    #[tokio::test]
    async fn test_settles_on_load() {
        let mut driver = ScriptedEvents {
            batches: VecDeque::from(vec![
                vec![LifecycleEvent::NavigationStarted],
                vec![],
                vec![LifecycleEvent::LoadFired],
            ]),
        };
        let mut flags = LifecycleFlags::default();
        let w = watcher();
        let s = w.await_settled(&mut driver, &mut flags, w.timeout).await.unwrap();
        assert_eq!(s, Settlement::Loaded);
        assert!(s.is_settled());
    }

    #[tokio::test]
    async fn test_times_out_without_load() {
        let mut driver = ScriptedEvents { batches: VecDeque::new() };
        let mut flags = LifecycleFlags::default();
        let w = watcher();
        let s = w.await_settled(&mut driver, &mut flags, Duration::from_millis(20)).await.unwrap();
        assert_eq!(s, Settlement::TimedOut);
        assert!(!s.is_settled());
    }

    #[tokio::test]
    async fn test_download_short_circuits() {
        let mut driver = ScriptedEvents {
            batches: VecDeque::from(vec![vec![
                LifecycleEvent::NavigationStarted,
                LifecycleEvent::Response(DocumentResponse {
                    content_disposition: Some("attachment".into()),
                    ..Default::default()
                }),
            ]]),
        };
        let mut flags = LifecycleFlags::default();
        let w = watcher();
        let s = w.await_settled(&mut driver, &mut flags, Duration::from_secs(5)).await.unwrap();
        assert_eq!(s, Settlement::Download);
    }

    #[tokio::test]
    async fn test_arm_discards_stale_load() {
        let mut driver = ScriptedEvents {
            batches: VecDeque::from(vec![vec![LifecycleEvent::LoadFired]]),
        };
        let mut flags = LifecycleFlags { load_fired: true, ..Default::default() };
        let w = watcher();
        w.arm(&mut driver, &mut flags).await.unwrap();
        assert!(!flags.load_fired);
        let s = w.await_settled(&mut driver, &mut flags, Duration::from_millis(20)).await.unwrap();
        assert_eq!(s, Settlement::TimedOut);
    }
}
