use gpui::{
    AnyElement, Context, IntoElement, ParentElement, Styled, div, prelude::FluentBuilder, px,
};
use gpui_component::{
    ActiveTheme, StyledExt,
    button::{Button, ButtonVariants},
    input::Input,
    v_flex,
};

use super::{AppView, Screen};

impl AppView {
    pub(super) fn render_gate_view(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let (border, panel, muted) = (theme.border, theme.group_box, theme.muted_foreground);

        let unlock = Button::new("gate-unlock")
            .primary()
            .label("Continue")
            .on_click(cx.listener(|this, _, _, cx| {
                this.try_unlock(cx);
                cx.notify();
            }));

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .child(
                v_flex()
                    .gap_3()
                    .p_6()
                    .w(px(360.0))
                    .rounded_lg()
                    .border_1()
                    .border_color(border)
                    .bg(panel)
                    .child(div().text_lg().font_semibold().child("Gesture Capture"))
                    .child(
                        div()
                            .text_sm()
                            .text_color(muted)
                            .child("Enter your name to start recording."),
                    )
                    .child(Input::new(&self.name_input))
                    .when(self.notice.is_none(), |this| this.child(unlock)),
            )
            .into_any_element()
    }

    fn try_unlock(&mut self, cx: &mut Context<'_, Self>) {
        let input = self.name_input.read(cx).value().to_string();
        match self.access.unlock(&input) {
            Ok(owner) => {
                self.owner = Some(owner);
                self.screen = Screen::Download;
            }
            Err(err) => self.show_notice("Access denied", err.to_string()),
        }
    }
}
