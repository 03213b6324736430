use iced::widget::{button, column, container, progress_bar, scrollable, text, Column, Row};
use iced::{Alignment, Element, Length};

use crate::audio::types::PlaybackState;

#[derive(Debug, Clone)]
pub enum ControlMessage {
    PlayPause,
    Stop,
    Prev,
    Next,
    ClearMark,
    OpenFile,
    Select(usize),
}

/// Format seconds as MM:SS.
pub fn format_time(seconds: f64) -> String {
    let total_secs = seconds.max(0.0) as u64;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{mins}:{secs:02}")
}

/// Build the transport controls view.
pub fn view_controls<'a>(
    status: PlaybackState,
    position: f64,
    duration: f64,
    has_mark: bool,
    loading: Option<f32>,
) -> Element<'a, ControlMessage> {
    let play_label = match status {
        PlaybackState::Playing => "Pause",
        PlaybackState::Paused => "Resume",
        PlaybackState::Idle => "Play",
    };

    let open_btn = button(text("Open File")).on_press(ControlMessage::OpenFile);
    let prev_btn = button(text("Prev")).on_press(ControlMessage::Prev);
    let play_btn = button(text(play_label)).on_press(ControlMessage::PlayPause);
    let stop_btn = button(text("Stop")).on_press(ControlMessage::Stop);
    let next_btn = button(text("Next")).on_press(ControlMessage::Next);

    let time_display = text(format!(
        "{} / {}",
        format_time(position * duration),
        format_time(duration)
    ))
    .size(16);

    let mut controls_row = Row::new()
        .spacing(10)
        .align_y(Alignment::Center)
        .push(open_btn)
        .push(prev_btn)
        .push(play_btn)
        .push(stop_btn)
        .push(next_btn)
        .push(time_display);

    if has_mark {
        controls_row =
            controls_row.push(button(text("Clear Mark")).on_press(ControlMessage::ClearMark));
    }

    let mut content = Column::new().spacing(5).push(controls_row);
    if let Some(fraction) = loading {
        content = content.push(
            column![
                text("Loading...").size(12),
                progress_bar(0.0..=1.0, fraction)
            ]
            .spacing(2)
            .width(Length::Fixed(300.0)),
        );
    }

    container(content).padding(10).into()
}

/// List of playlist titles; the selected entry is marked.
pub fn view_playlist<'a>(titles: &[String], selected: Option<usize>) -> Element<'a, ControlMessage> {
    let entries = titles.iter().enumerate().fold(Column::new().spacing(2), |col, (i, title)| {
        let label = if Some(i) == selected {
            format!("> {title}")
        } else {
            format!("  {title}")
        };
        col.push(
            button(text(label).size(14))
                .style(button::text)
                .on_press(ControlMessage::Select(i)),
        )
    });

    container(scrollable(entries))
        .padding(10)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}
