//! Bounded fire-and-forget notification tasks

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::{playback_url, Mail, MailSender, RecordingNotifier};
use crate::config::{MailConfig, SentryConfig};
use crate::recording::SessionSnapshot;

/// Spawns notification work onto a tokio runtime without ever blocking the
/// caller.
///
/// At most `max_in_flight` tasks talk to the network at once; the rest wait
/// for a permit. Each task owns copies of what it needs, so nothing reaches
/// back into the capture loop.
pub struct NotificationPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    notifier: Arc<dyn RecordingNotifier>,
    mailer: Option<Arc<dyn MailSender>>,
    mail: MailConfig,
    history_prefix: String,
    prefix_len: usize,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NotificationPool {
    pub fn new(
        handle: Handle,
        notifier: Arc<dyn RecordingNotifier>,
        mailer: Option<Arc<dyn MailSender>>,
        config: &SentryConfig,
    ) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(config.notify.max_in_flight.max(1))),
            notifier,
            mailer,
            mail: config.mail.clone(),
            history_prefix: config.notify.history_prefix.clone(),
            prefix_len: config.notify.locator_prefix_len,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Tell the recorder to start, then mail the playback URL and `still`.
    pub fn spawn_start(&self, session: SessionSnapshot, still: Option<PathBuf>) {
        let permits = self.permits.clone();
        let notifier = self.notifier.clone();
        let mailer = self.mailer.clone();
        let mail = self.mail.clone();
        let prefix = self.history_prefix.clone();
        let prefix_len = self.prefix_len;

        self.track(self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let locator = match notifier.notify_start().await {
                Ok(locator) => locator,
                Err(e) => {
                    log::error!("Session {}: start notification failed: {}", session.session_id, e);
                    return;
                }
            };
            log::info!(
                "Session {}: recorder started, locator {:?}",
                session.session_id,
                locator.trim()
            );

            let Some(mailer) = mailer else {
                return;
            };
            let url = match playback_url(&prefix, &locator, prefix_len) {
                Ok(url) => url,
                Err(e) => {
                    log::error!("Session {}: no mail sent: {}", session.session_id, e);
                    return;
                }
            };
            if let Err(e) = mailer.send(Mail::alert(&mail, url, still, Local::now())).await {
                log::error!("Session {}: {}", session.session_id, e);
            }
        }));
    }

    /// Tell the recorder to stop.
    pub fn spawn_stop(&self, session: SessionSnapshot) {
        let permits = self.permits.clone();
        let notifier = self.notifier.clone();

        self.track(self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            match notifier.notify_stop().await {
                Ok(ack) => log::info!(
                    "Session {}: recorder stopped ({})",
                    session.session_id,
                    ack.trim()
                ),
                Err(e) => log::error!(
                    "Session {}: stop notification failed: {}",
                    session.session_id,
                    e
                ),
            }
        }));
    }

    /// Tasks spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        match self.tasks.lock() {
            Ok(tasks) => tasks.iter().filter(|t| !t.is_finished()).count(),
            Err(_) => 0,
        }
    }

    /// Wait for every outstanding task.
    pub async fn drain(&self) {
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if tasks.is_empty() {
            return;
        }
        log::info!("Waiting for {} notification task(s)", tasks.len());
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                log::error!("Notification task panicked: {}", e);
            }
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        match self.tasks.lock() {
            Ok(mut tasks) => {
                tasks.retain(|t| !t.is_finished());
                tasks.push(task);
            }
            Err(_) => log::warn!("Notification task list poisoned; task left untracked"),
        }
    }
}
