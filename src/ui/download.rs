use std::{path::PathBuf, thread};

use crossbeam_channel::Sender;
use gpui::{AnyElement, Context, IntoElement, ParentElement, Styled, div};
use gpui_component::{ActiveTheme, StyledExt, h_flex, tag::Tag, v_flex};

use gesture_capture::model_download::{ModelDownloadEvent, ModelKind, ensure_models_ready};

use super::AppView;

pub(super) enum DownloadMessage {
    Event(ModelDownloadEvent),
    Done,
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
enum RowState {
    Waiting,
    Present,
    Downloading,
    Ready,
    Skipped(String),
}

#[derive(Clone, Debug)]
struct ModelRow {
    model: ModelKind,
    downloaded: u64,
    total: Option<u64>,
    state: RowState,
}

/// One progress row per model the detector needs.
pub(super) struct DownloadState {
    rows: Vec<ModelRow>,
    pub(super) error: Option<String>,
    pub(super) finished: bool,
}

impl DownloadState {
    pub(super) fn new(models: &[ModelKind]) -> Self {
        Self {
            rows: models
                .iter()
                .map(|&model| ModelRow {
                    model,
                    downloaded: 0,
                    total: None,
                    state: RowState::Waiting,
                })
                .collect(),
            error: None,
            finished: false,
        }
    }

    fn apply(&mut self, msg: DownloadMessage) {
        let event = match msg {
            DownloadMessage::Event(event) => event,
            DownloadMessage::Done => {
                self.finished = true;
                return;
            }
            DownloadMessage::Error(err) => {
                self.error = Some(err);
                self.finished = false;
                return;
            }
        };

        let model = match &event {
            ModelDownloadEvent::AlreadyPresent { model }
            | ModelDownloadEvent::Started { model, .. }
            | ModelDownloadEvent::Progress { model, .. }
            | ModelDownloadEvent::Finished { model }
            | ModelDownloadEvent::Skipped { model, .. } => *model,
        };
        let Some(row) = self.rows.iter_mut().find(|row| row.model == model) else {
            return;
        };
        match event {
            ModelDownloadEvent::AlreadyPresent { .. } => row.state = RowState::Present,
            ModelDownloadEvent::Started { total, .. } => {
                row.total = total;
                row.state = RowState::Downloading;
            }
            ModelDownloadEvent::Progress {
                downloaded, total, ..
            } => {
                row.downloaded = downloaded;
                row.total = total;
            }
            ModelDownloadEvent::Finished { .. } => row.state = RowState::Ready,
            ModelDownloadEvent::Skipped { reason, .. } => row.state = RowState::Skipped(reason),
        }
    }
}

impl AppView {
    pub(super) fn poll_download_events(&mut self) {
        while let Ok(msg) = self.download_rx.try_recv() {
            self.download.apply(msg);
        }
    }

    pub(super) fn render_download_view(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let state = &self.download;
        let theme = cx.theme();

        let (status_icon, status_text, status_color) = if state.error.is_some() {
            ("✗", "Model download failed", theme.accent)
        } else if state.finished {
            ("✓", "Models ready", theme.success)
        } else {
            ("⟳", "Downloading models", theme.foreground)
        };

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_color(status_color)
                            .font_semibold()
                            .child(format!("{status_icon} {status_text}")),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child("Preparing the landmark detectors"),
                    ),
            );

        for row in &state.rows {
            container = container.child(
                v_flex()
                    .gap_1()
                    .child(
                        h_flex()
                            .gap_2()
                            .child(div().font_semibold().child(row.model.to_string()))
                            .child(
                                div()
                                    .text_sm()
                                    .text_color(theme.muted_foreground)
                                    .child(row_detail(row)),
                            ),
                    )
                    .child(
                        div()
                            .px_3()
                            .py_1()
                            .rounded_md()
                            .border_1()
                            .border_color(theme.border)
                            .bg(theme.muted)
                            .font_family(theme.mono_font_family.clone())
                            .text_color(theme.foreground)
                            .child(row_bar(row)),
                    ),
            );
        }

        if let Some(err) = &state.error {
            container = container.child(Tag::danger().rounded_full().child(format!("Error: {err}")));
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .child(container)
            .into_any_element()
    }
}

pub(super) fn spawn_model_download(
    models_dir: PathBuf,
    models: Vec<ModelKind>,
    tx: Sender<DownloadMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let result = ensure_models_ready(&models_dir, &models, |event| {
            let _ = tx.send(DownloadMessage::Event(event));
        });

        match result {
            Ok(()) => {
                let _ = tx.send(DownloadMessage::Done);
            }
            Err(err) => {
                log::error!(
                    "failed to prepare models in {}: {err:?}",
                    models_dir.display()
                );
                let _ = tx.send(DownloadMessage::Error(format!("{err:#}")));
            }
        }
    })
}

fn row_detail(row: &ModelRow) -> String {
    match &row.state {
        RowState::Waiting => "waiting".to_string(),
        RowState::Present => "already present".to_string(),
        RowState::Ready => "downloaded".to_string(),
        RowState::Skipped(reason) => format!("unavailable, tracking continues without it ({reason})"),
        RowState::Downloading => match row.total {
            Some(total) if total > 0 => format!("{} / {} KB", row.downloaded / 1024, total / 1024),
            _ => format!("{} KB", row.downloaded / 1024),
        },
    }
}

fn row_bar(row: &ModelRow) -> String {
    match row.state {
        RowState::Present | RowState::Ready => progress_bar_string(1, Some(1)),
        RowState::Waiting | RowState::Skipped(_) => progress_bar_string(0, Some(1)),
        RowState::Downloading => progress_bar_string(row.downloaded, row.total),
    }
}

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    const BAR_LEN: usize = 30;
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(BAR_LEN - filled),
                pct * 100.0
            )
        }
        _ => {
            let spinner_width = ((downloaded / 64) as usize % BAR_LEN) + 1;
            format!("[{:-<spinner_width$}] unknown size", ">")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event: ModelDownloadEvent) -> DownloadMessage {
        DownloadMessage::Event(event)
    }

    #[test]
    fn bar_fills_with_progress() {
        assert_eq!(
            progress_bar_string(50, Some(100)),
            format!("[{}{}]  50.0%", "=".repeat(15), " ".repeat(15))
        );
        assert!(progress_bar_string(0, None).ends_with("unknown size"));
    }

    #[test]
    fn events_update_their_own_row() {
        let mut state = DownloadState::new(&[ModelKind::PalmDetector, ModelKind::FaceMarks]);
        state.apply(event(ModelDownloadEvent::AlreadyPresent {
            model: ModelKind::PalmDetector,
        }));
        state.apply(event(ModelDownloadEvent::Started {
            model: ModelKind::FaceMarks,
            total: Some(2048),
        }));
        state.apply(event(ModelDownloadEvent::Progress {
            model: ModelKind::FaceMarks,
            downloaded: 1024,
            total: Some(2048),
        }));

        assert_eq!(state.rows[0].state, RowState::Present);
        assert_eq!(state.rows[0].downloaded, 0);
        assert_eq!(state.rows[1].state, RowState::Downloading);
        assert_eq!(row_detail(&state.rows[1]), "1 / 2 KB");
        assert!(!state.finished);

        state.apply(event(ModelDownloadEvent::Skipped {
            model: ModelKind::FaceMarks,
            reason: "offline".into(),
        }));
        state.apply(DownloadMessage::Done);
        assert!(matches!(state.rows[1].state, RowState::Skipped(_)));
        assert!(state.finished);
    }

    #[test]
    fn error_blocks_the_session() {
        let mut state = DownloadState::new(&[ModelKind::HandLandmarks]);
        state.apply(DownloadMessage::Error("disk full".into()));
        assert!(!state.finished);
        assert_eq!(state.error.as_deref(), Some("disk full"));
    }
}
