use std::time::Instant;

use crossbeam_channel::bounded;
use gpui::{
    AnyElement, Context, IntoElement, ObjectFit, ParentElement, Styled, StyledImage, Window, div,
    img, prelude::FluentBuilder, px,
};
use gpui_component::{
    ActiveTheme, StyledExt,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use gesture_capture::{
    Error,
    pipeline::{
        CameraSettings, CompositeDetector, FrameGate, OverlayRenderer, TrackedFrame,
        start_camera_stream, start_detector,
    },
    session::{Conclusion, SessionController, SessionStatus, StatusCell},
};

use super::{
    AppView, Pipeline,
    render_util::{canvas_to_image, format_countdown},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transport {
    Start,
    Pause,
    Resume,
    Stop,
    Previous,
    Next,
}

impl AppView {
    pub(super) fn start_session(&mut self) {
        let Some(owner) = self.owner.clone() else {
            log::error!("session requested before the gate was unlocked");
            return;
        };
        let session = SessionController::new(
            owner,
            self.config.session.gestures.clone(),
            &self.config.session,
        );

        match self.start_pipeline(session.status_cell()) {
            Ok(pipeline) => self.pipeline = Some(pipeline),
            Err(err) => {
                log::error!("failed to start camera: {err:?}");
                let message = format!("{err:#}");
                self.camera_error = Some(message.clone());
                self.show_notice("Camera unavailable", message);
            }
        }
        self.session = Some(session);
    }

    fn start_pipeline(&self, status: StatusCell) -> anyhow::Result<Pipeline> {
        let gate = FrameGate::new();
        let (frame_tx, frame_rx) = bounded(1);
        let (tracked_tx, tracked_rx) = bounded(1);

        let detector_config = self.config.detector.clone();
        let renderer = OverlayRenderer::new(
            self.config.overlay.canvas_width,
            self.config.overlay.canvas_height,
        );
        let detector = start_detector(
            move || CompositeDetector::from_config(&detector_config),
            renderer,
            status.clone(),
            frame_rx,
            tracked_tx,
        );

        let camera = start_camera_stream(
            CameraSettings::from_config(&self.config.camera),
            gate,
            status,
            frame_tx,
        )?;

        Ok(Pipeline {
            tracked_rx,
            _camera: camera,
            _detector: detector,
        })
    }

    fn poll_pipeline(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let tracked = self
            .pipeline
            .as_ref()
            .and_then(|pipeline| pipeline.tracked_rx.try_recv().ok());

        if let Some(TrackedFrame {
            canvas,
            record,
            permit,
        }) = tracked
        {
            self.tracking = true;
            if let (Some(session), Some(record)) = (self.session.as_mut(), record) {
                session.collect(record);
            }
            if let Some(image) = canvas_to_image(canvas) {
                self.replace_latest_image(image, window, cx);
            }
            drop(permit);
        }

        let outcome = self
            .session
            .as_mut()
            .and_then(|session| session.poll(Instant::now(), &mut self.sink));
        if let Some(outcome) = outcome {
            self.handle_conclusion(outcome);
        }
    }

    fn handle_conclusion(&mut self, outcome: gesture_capture::Result<Conclusion>) {
        match outcome {
            Ok(Conclusion::Exported(receipt)) => {
                self.last_export = Some(format!(
                    "Saved {} ({} frames)",
                    receipt.path.display(),
                    receipt.frames
                ));
                let done = self
                    .session
                    .as_ref()
                    .is_some_and(|session| session.status() == SessionStatus::Done);
                if done {
                    self.show_notice(
                        "All gestures recorded",
                        "Every prompt has been saved. Thank you!",
                    );
                }
            }
            Ok(Conclusion::AlreadySaved) => {}
            Err(err @ Error::EmptyCapture { .. }) => {
                self.show_notice("Nothing recorded", err.to_string())
            }
            Err(err) => self.show_notice(
                "Recording not saved",
                format!("{err}. The frames are kept; press Stop to try saving again."),
            ),
        }
    }

    fn apply_transport(&mut self, action: Transport) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let now = Instant::now();
        let result = match action {
            Transport::Start => session.start(now),
            Transport::Pause => session.pause(),
            Transport::Resume => session.resume(now),
            Transport::Previous => session.previous().map(|_| ()),
            Transport::Next => session.next().map(|_| ()),
            Transport::Stop => {
                let outcome = session.stop(&mut self.sink);
                self.handle_conclusion(outcome);
                return;
            }
        };
        if let Err(err) = result {
            log::warn!("{action:?} ignored: {err}");
        }
    }

    fn transport_button(
        id: &'static str,
        label: &'static str,
        action: Transport,
        cx: &mut Context<'_, Self>,
    ) -> Button {
        Button::new(id)
            .label(label)
            .when(action == Transport::Start, |this| this.primary())
            .when(action != Transport::Start, |this| this.outline())
            .on_click(cx.listener(move |this, _, _, cx| {
                this.apply_transport(action);
                cx.notify();
            }))
    }

    fn render_transport(
        &self,
        session: &SessionController,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let mut actions = Vec::new();
        match session.status() {
            SessionStatus::Idle => {
                if session.gesture_index() > 0 {
                    actions.push(("previous", "Previous", Transport::Previous));
                }
                actions.push(("start", "Start", Transport::Start));
                if !session.is_last_gesture() {
                    actions.push(("next", "Next", Transport::Next));
                }
            }
            SessionStatus::Running => {
                if !session.is_settling() {
                    actions.push(("pause", "Pause", Transport::Pause));
                }
                actions.push(("stop", "Stop", Transport::Stop));
            }
            SessionStatus::Paused => {
                actions.push(("resume", "Resume", Transport::Resume));
                actions.push(("stop", "Stop", Transport::Stop));
            }
            SessionStatus::Done => {}
        }

        let buttons: Vec<Button> = actions
            .into_iter()
            .map(|(id, label, action)| Self::transport_button(id, label, action, cx))
            .collect();
        h_flex().gap_2().children(buttons).into_any_element()
    }

    pub(super) fn render_session_view(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        self.poll_pipeline(window, cx);

        let Some(session) = self.session.as_ref() else {
            return div().into_any_element();
        };

        let theme = cx.theme();
        let (border, panel, muted, success) = (
            theme.border,
            theme.group_box,
            theme.muted_foreground,
            theme.success,
        );
        let (canvas_w, canvas_h) = (
            self.config.overlay.canvas_width as f32,
            self.config.overlay.canvas_height as f32,
        );

        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element()
        } else {
            let placeholder = self
                .camera_error
                .clone()
                .unwrap_or_else(|| "Waiting for camera...".to_string());
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(muted)
                .child(placeholder)
                .into_any_element()
        };

        let tracking_label = if self.tracking {
            "tracking"
        } else {
            "starting up..."
        };
        let status_line = if session.is_settling() {
            "saving...".to_string()
        } else {
            session.status().label().to_string()
        };
        let recording = matches!(
            session.status(),
            SessionStatus::Running | SessionStatus::Paused
        );

        let info = v_flex()
            .gap_3()
            .p_4()
            .w(px(320.0))
            .rounded_lg()
            .border_1()
            .border_color(border)
            .bg(panel)
            .child(
                div()
                    .text_sm()
                    .text_color(muted)
                    .child(format!("Recording as {}", session.owner())),
            )
            .child(div().text_sm().text_color(muted).child(format!(
                "Gesture {} of {}",
                session.gesture_index() + 1,
                session.gesture_count()
            )))
            .child(div().text_xl().font_semibold().child(session.gesture().to_string()))
            .child(
                div()
                    .text_3xl()
                    .font_semibold()
                    .font_family(theme.mono_font_family.clone())
                    .child(format_countdown(session.remaining_secs())),
            )
            .child(
                h_flex()
                    .gap_2()
                    .child(div().text_color(success).child("●"))
                    .child(div().child(status_line))
                    .child(div().text_sm().text_color(muted).child(tracking_label)),
            )
            .when(recording, |this| {
                this.child(
                    div()
                        .text_sm()
                        .text_color(muted)
                        .child(format!("frames: {}", session.buffered_frames())),
                )
            })
            .when_some(self.last_export.clone(), |this, saved| {
                this.child(div().text_xs().text_color(muted).child(saved))
            });

        let transport = self
            .notice
            .is_none()
            .then(|| self.render_transport(session, cx));

        h_flex()
            .size_full()
            .gap_4()
            .p_4()
            .items_start()
            .justify_center()
            .child(
                div()
                    .w(px(canvas_w))
                    .h(px(canvas_h))
                    .overflow_hidden()
                    .rounded_lg()
                    .bg(gpui::rgb(0x000000))
                    .child(frame_view),
            )
            .child(info.children(transport))
            .into_any_element()
    }
}
