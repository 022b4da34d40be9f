//! Voice loop: device events → transcript → barge-in check → silence countdown →
//! pipeline → spoken reply.

use crate::session::{stop_notice, SessionInner};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use vernon_voice::{CaptureUpdate, DeviceEvent, SilenceEvent};

pub(crate) struct VoiceChannels {
    pub(crate) device: mpsc::UnboundedReceiver<DeviceEvent>,
    pub(crate) silence: mpsc::UnboundedReceiver<SilenceEvent>,
}

pub(crate) async fn run_voice_loop(inner: Arc<SessionInner>, mut channels: VoiceChannels) {
    loop {
        enum Event {
            Device(DeviceEvent),
            Silence(SilenceEvent),
            Closed,
        }

        let event = tokio::select! {
            event = channels.device.recv() => event.map_or(Event::Closed, Event::Device),
            event = channels.silence.recv() => event.map_or(Event::Closed, Event::Silence),
        };

        match event {
            Event::Device(event) => on_device_event(&inner, event).await,
            Event::Silence(SilenceEvent::SilenceDetected { transcript, quiet_for, .. }) => {
                let captured = inner.capture.take_transcript();
                inner.silence.clear_transcript();
                let text = if captured.trim().is_empty() {
                    transcript
                } else {
                    captured
                };
                if text.trim().is_empty() {
                    continue;
                }
                info!(
                    chars = text.chars().count(),
                    quiet_ms = quiet_for.as_millis() as u64,
                    "utterance finalized"
                );
                inner.respond(&text).await;
            }
            Event::Closed => break,
        }
    }
    debug!("voice loop ended");
}

async fn on_device_event(inner: &SessionInner, event: DeviceEvent) {
    match inner.capture.handle_event(event).await {
        CaptureUpdate::Transcript(output) => {
            let barged_in = !output.interim_text.is_empty()
                && inner.coordinator.observe_interim(&output.interim_text).is_some();
            if barged_in {
                // The user holds the floor: stay Active until the recognizer's next
                // update (normally the final fragment) starts the quiet countdown.
                inner.silence.speech_detected(&output.combined());
            } else {
                inner.silence.observe_transcript(&output.combined());
            }
        }
        CaptureUpdate::Stopped(reason) => {
            inner.silence.stop();
            inner.set_notice(stop_notice(reason));
        }
        CaptureUpdate::Restarted { attempt } => debug!(attempt, "recognizer restarted"),
        CaptureUpdate::Warning(kind) => debug!(error = %kind, "recognizer warning"),
        CaptureUpdate::Ignored => {}
    }
}
