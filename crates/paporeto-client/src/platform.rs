//! Side effects the service layer asks of its host: navigation, desktop
//! notifications, foreground visibility, audio output and global style
//! variables.
//!
//! [`Headless`] implements every seam in-process and records what was asked
//! of it; the CLI and the tests run on it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Not decided yet; asking will prompt the user.
    Default,
    Granted,
    Denied,
    /// The host cannot show notifications at all.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
}

#[derive(Error, Debug)]
#[error("audio output unavailable: {0}")]
pub struct AudioError(pub String);

pub trait Navigator: Send + Sync {
    fn redirect(&self, target: &str);
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn permission(&self) -> Permission;

    /// Prompt the user and return the decision.
    async fn request_permission(&self) -> Permission;

    fn show(&self, notification: &DesktopNotification);
}

pub trait Visibility: Send + Sync {
    /// Whether the application is in the foreground.
    fn is_visible(&self) -> bool;
}

pub trait AudioOut: Send + Sync {
    /// Play mono samples in `[-1, 1]`.
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<(), AudioError>;
}

pub trait StyleSink: Send + Sync {
    fn set_property(&self, name: &str, value: &str);
}

/// The host seams, bundled.
#[derive(Clone)]
pub struct Platform {
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
    pub visibility: Arc<dyn Visibility>,
    pub audio: Arc<dyn AudioOut>,
    pub style: Arc<dyn StyleSink>,
}

impl Platform {
    /// Every seam served by one [`Headless`] host.
    pub fn from_headless(host: Arc<Headless>) -> Self {
        Self {
            navigator: host.clone(),
            notifier: host.clone(),
            visibility: host.clone(),
            audio: host.clone(),
            style: host,
        }
    }

    pub fn headless() -> (Self, Arc<Headless>) {
        let host = Arc::new(Headless::new());
        (Self::from_headless(Arc::clone(&host)), host)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process host that logs and records every side effect.
pub struct Headless {
    permission: Mutex<Permission>,
    prompt_answer: Mutex<Permission>,
    prompts: AtomicUsize,
    visible: AtomicBool,
    audio_broken: AtomicBool,
    redirects: Mutex<Vec<String>>,
    shown: Mutex<Vec<DesktopNotification>>,
    cues: Mutex<Vec<usize>>,
    styles: Mutex<Vec<(String, String)>>,
}

impl Default for Headless {
    fn default() -> Self {
        Self::new()
    }
}

impl Headless {
    /// Backgrounded, permission undecided, prompts answered with "granted".
    pub fn new() -> Self {
        Self {
            permission: Mutex::new(Permission::Default),
            prompt_answer: Mutex::new(Permission::Granted),
            prompts: AtomicUsize::new(0),
            visible: AtomicBool::new(false),
            audio_broken: AtomicBool::new(false),
            redirects: Mutex::new(Vec::new()),
            shown: Mutex::new(Vec::new()),
            cues: Mutex::new(Vec::new()),
            styles: Mutex::new(Vec::new()),
        }
    }

    pub fn set_permission(&self, permission: Permission) {
        *lock(&self.permission) = permission;
    }

    pub fn answer_prompts_with(&self, permission: Permission) {
        *lock(&self.prompt_answer) = permission;
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn break_audio(&self) {
        self.audio_broken.store(true, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn redirects(&self) -> Vec<String> {
        lock(&self.redirects).clone()
    }

    pub fn notifications(&self) -> Vec<DesktopNotification> {
        lock(&self.shown).clone()
    }

    /// Sample counts of the cues played so far.
    pub fn cues(&self) -> Vec<usize> {
        lock(&self.cues).clone()
    }

    /// Last value set for a style property.
    pub fn style(&self, name: &str) -> Option<String> {
        lock(&self.styles)
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

impl Navigator for Headless {
    fn redirect(&self, target: &str) {
        info!(target, "redirect");
        lock(&self.redirects).push(target.to_string());
    }
}

#[async_trait]
impl Notifier for Headless {
    fn permission(&self) -> Permission {
        *lock(&self.permission)
    }

    async fn request_permission(&self) -> Permission {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let answer = *lock(&self.prompt_answer);
        *lock(&self.permission) = answer;
        answer
    }

    fn show(&self, notification: &DesktopNotification) {
        info!(title = %notification.title, body = %notification.body, "notification");
        lock(&self.shown).push(notification.clone());
    }
}

impl Visibility for Headless {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

impl AudioOut for Headless {
    fn play(&self, samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
        if self.audio_broken.load(Ordering::SeqCst) {
            return Err(AudioError("no output device".into()));
        }
        lock(&self.cues).push(samples.len());
        Ok(())
    }
}

impl StyleSink for Headless {
    fn set_property(&self, name: &str, value: &str) {
        lock(&self.styles).push((name.to_string(), value.to_string()));
    }
}
