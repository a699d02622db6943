use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, unbounded};
use gpui::{
    AnyElement, App, AppContext, Context, Entity, IntoElement, ParentElement, Render,
    RenderImage, SharedString, Styled, TitlebarOptions, Window, WindowOptions, div,
};
use gpui_component::{
    ActiveTheme, Root, StyledExt,
    button::{Button, ButtonVariants},
    input::InputState,
    v_flex,
};

use gesture_capture::{
    access::{AccessGate, Owner},
    config::Config,
    export::DirectorySink,
    model_download::required_models,
    pipeline::{CameraStream, TrackedFrame},
    session::SessionController,
};

mod download;

use download::{DownloadMessage, DownloadState};
mod gate_view;
mod render_util;
mod session_view;

pub fn launch_ui(app: &mut App, config: Config) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Gesture Capture".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|cx| AppView::new(config, window, cx));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    config: Config,
    screen: Screen,
    access: AccessGate,
    owner: Option<Owner>,
    name_input: Entity<InputState>,
    notice: Option<Notice>,
    download: DownloadState,
    download_rx: Receiver<DownloadMessage>,
    _download_handle: thread::JoinHandle<()>,
    session: Option<SessionController>,
    sink: DirectorySink,
    pipeline: Option<Pipeline>,
    camera_error: Option<String>,
    tracking: bool,
    last_export: Option<String>,
    latest_image: Option<Arc<RenderImage>>,
}

enum Screen {
    Gate,
    Download,
    Session,
}

/// Blocking message; transport controls stay hidden until it is dismissed.
struct Notice {
    title: SharedString,
    message: SharedString,
}

/// Threads feeding the session screen. Dropping it stops the camera; the detector worker
/// exits once the camera's sender is gone.
struct Pipeline {
    tracked_rx: Receiver<TrackedFrame>,
    _camera: CameraStream,
    _detector: thread::JoinHandle<()>,
}

impl AppView {
    fn new(config: Config, window: &mut Window, cx: &mut Context<'_, Self>) -> Self {
        let models = required_models(config.detector.track_face);
        let (download_tx, download_rx) = unbounded();
        let download_handle = download::spawn_model_download(
            config.detector.models_dir.clone(),
            models.clone(),
            download_tx,
        );
        let name_input = cx.new(|cx| InputState::new(window, cx).placeholder("Your name"));

        Self {
            access: AccessGate::new(&config.access.allowed_users),
            sink: DirectorySink::new(config.export.output_dir.clone()),
            config,
            screen: Screen::Gate,
            owner: None,
            name_input,
            notice: None,
            download: DownloadState::new(&models),
            download_rx,
            _download_handle: download_handle,
            session: None,
            pipeline: None,
            camera_error: None,
            tracking: false,
            last_export: None,
            latest_image: None,
        }
    }

    fn show_notice(&mut self, title: impl Into<SharedString>, message: impl Into<SharedString>) {
        self.notice = Some(Notice {
            title: title.into(),
            message: message.into(),
        });
    }

    fn render_notice(&self, cx: &mut Context<'_, Self>) -> Option<AnyElement> {
        let notice = self.notice.as_ref()?;
        let theme = cx.theme();
        let (border, background, muted) =
            (theme.border, theme.background, theme.muted_foreground);

        Some(
            div()
                .absolute()
                .inset_0()
                .flex()
                .items_center()
                .justify_center()
                .bg(gpui::rgba(0x00000099))
                .child(
                    v_flex()
                        .gap_3()
                        .p_6()
                        .w(gpui::px(420.0))
                        .rounded_lg()
                        .border_1()
                        .border_color(border)
                        .bg(background)
                        .child(div().font_semibold().child(notice.title.clone()))
                        .child(div().text_sm().text_color(muted).child(notice.message.clone()))
                        .child(
                            Button::new("notice-dismiss")
                                .primary()
                                .label("OK")
                                .on_click(cx.listener(|this, _, _, cx| {
                                    this.notice = None;
                                    cx.notify();
                                })),
                        ),
                )
                .into_any_element(),
        )
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.poll_download_events();

        let view = match self.screen {
            Screen::Gate => self.render_gate_view(cx),
            Screen::Download => {
                let view = self.render_download_view(cx);
                if self.download.finished {
                    self.start_session();
                    self.screen = Screen::Session;
                }
                view
            }
            Screen::Session => self.render_session_view(window, cx),
        };

        let notice = self.render_notice(cx);
        let theme = cx.theme();
        div()
            .relative()
            .size_full()
            .bg(theme.background)
            .text_color(theme.foreground)
            .child(view)
            .children(notice)
    }
}
