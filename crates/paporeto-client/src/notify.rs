//! Desktop notifications and the incoming-message sound.

use std::f32::consts::TAU;
use std::sync::Arc;

use paporeto_shared::constants::NOTIFICATION_ICON;
use paporeto_store::{Database, Preferences};
use tracing::{debug, warn};

use crate::platform::{DesktopNotification, Permission, Platform};

pub const CUE_SAMPLE_RATE: u32 = 44_100;

const CUE_SECONDS: f32 = 0.3;
const CUE_SECOND_TONE_AT: f32 = 0.1;
const CUE_LOW_HZ: f32 = 880.0;
const CUE_HIGH_HZ: f32 = 1100.0;
const CUE_START_GAIN: f32 = 0.15;
const CUE_END_GAIN: f32 = 0.001;

/// Two-tone cue: 880 Hz then 1100 Hz, with the gain falling exponentially
/// from 0.15 to 0.001 over 0.3 s.
pub fn synthesize_cue(sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let len = (CUE_SECONDS * rate).round() as usize;
    let decay = CUE_END_GAIN / CUE_START_GAIN;
    let mut phase = 0.0f32;
    let mut samples = Vec::with_capacity(len);
    for i in 0..len {
        let t = i as f32 / rate;
        let freq = if t < CUE_SECOND_TONE_AT { CUE_LOW_HZ } else { CUE_HIGH_HZ };
        let gain = CUE_START_GAIN * decay.powf(t / CUE_SECONDS);
        samples.push(gain * phase.sin());
        phase = (phase + TAU * freq / rate) % TAU;
    }
    samples
}

pub struct NotificationBridge {
    store: Arc<Database>,
    platform: Platform,
}

impl NotificationBridge {
    pub fn new(store: Arc<Database>, platform: Platform) -> Self {
        Self { store, platform }
    }

    fn preferences(&self) -> Preferences {
        self.store.preferences().unwrap_or_else(|e| {
            warn!(error = %e, "preferences unreadable, using defaults");
            Preferences::default()
        })
    }

    /// Ask for notification permission, prompting only while undecided.
    pub async fn request_permission(&self) -> bool {
        match self.platform.notifier.permission() {
            Permission::Granted => true,
            Permission::Denied | Permission::Unsupported => false,
            Permission::Default => {
                self.platform.notifier.request_permission().await == Permission::Granted
            }
        }
    }

    /// Show a desktop notification unless message notifications are off,
    /// the app is in the foreground or permission is missing.  Returns
    /// whether one was shown.
    ///
    /// `icon` is the in-app glyph of the event; desktop notifications always
    /// carry the application icon and badge.
    pub fn notify(&self, title: &str, body: &str, _icon: Option<&str>) -> bool {
        if !self.preferences().notif_msgs {
            return false;
        }
        if self.platform.visibility.is_visible() {
            return false;
        }
        if self.platform.notifier.permission() != Permission::Granted {
            return false;
        }
        self.platform.notifier.show(&DesktopNotification {
            title: title.to_string(),
            body: body.to_string(),
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_ICON.to_string(),
        });
        true
    }

    /// Play the message cue if sounds are enabled.  Audio failures are
    /// logged and dropped.
    pub fn play_cue(&self) {
        if !self.preferences().notif_sound {
            return;
        }
        let samples = synthesize_cue(CUE_SAMPLE_RATE);
        if let Err(e) = self.platform.audio.play(&samples, CUE_SAMPLE_RATE) {
            debug!(error = %e, "message cue not played");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bridge() -> (NotificationBridge, Arc<crate::platform::Headless>, Arc<Database>) {
        let store = Arc::new(Database::open_in_memory().unwrap());
        let (platform, host) = Platform::headless();
        (NotificationBridge::new(Arc::clone(&store), platform), host, store)
    }

    #[test]
    fn cue_has_two_tones_and_decays() {
        let samples = synthesize_cue(8_000);
        assert_eq!(samples.len(), 2_400);
        assert!(samples.iter().all(|s| s.abs() <= CUE_START_GAIN));

        let crossings = |range: &[f32]| range.windows(2).filter(|w| (w[0] < 0.0) != (w[1] < 0.0)).count();
        // 0.1 s of 880 Hz has ~176 zero crossings, 0.1 s of 1100 Hz ~220
        let low = crossings(&samples[..800]);
        let high = crossings(&samples[800..1600]);
        assert!((170..=182).contains(&low), "low tone crossings {low}");
        assert!((214..=226).contains(&high), "high tone crossings {high}");

        let head = samples[..100].iter().fold(0f32, |m, s| m.max(s.abs()));
        let tail = samples[2_300..].iter().fold(0f32, |m, s| m.max(s.abs()));
        assert!(tail < head / 20.0);
    }

    #[tokio::test]
    async fn permission_prompts_only_when_undecided() {
        let (bridge, host, _) = bridge();
        assert!(bridge.request_permission().await);
        assert_eq!(host.prompts(), 1);
        assert!(bridge.request_permission().await);
        assert_eq!(host.prompts(), 1);

        host.set_permission(Permission::Denied);
        assert!(!bridge.request_permission().await);
        assert_eq!(host.prompts(), 1);
    }

    #[test]
    fn notify_requires_all_three_gates() {
        let (bridge, host, store) = bridge();

        host.set_permission(Permission::Granted);
        assert!(bridge.notify("Ana", "Olá!", Some("💬")));
        assert_eq!(host.notifications()[0].icon, NOTIFICATION_ICON);
        assert_eq!(host.notifications()[0].badge, NOTIFICATION_ICON);

        host.set_visible(true);
        assert!(!bridge.notify("Ana", "Olá!", None));
        host.set_visible(false);

        host.set_permission(Permission::Default);
        assert!(!bridge.notify("Ana", "Olá!", None));
        host.set_permission(Permission::Granted);

        store.set_preference("notif_msgs", json!(false)).unwrap();
        assert!(!bridge.notify("Ana", "Olá!", None));
        assert_eq!(host.notifications().len(), 1);
    }

    #[test]
    fn cue_respects_sound_preference_and_swallows_failures() {
        let (bridge, host, store) = bridge();
        bridge.play_cue();
        assert_eq!(host.cues(), [synthesize_cue(CUE_SAMPLE_RATE).len()]);

        host.break_audio();
        bridge.play_cue();
        assert_eq!(host.cues().len(), 1);

        store.set_preference("notif_sound", json!(false)).unwrap();
        bridge.play_cue();
        assert_eq!(host.cues().len(), 1);
    }
}
