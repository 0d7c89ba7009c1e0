use crate::audio::AudioEngine;
use crate::core::PlayerCore;
use crate::library;
use crate::model::{NowPlaying, PlaybackState};
use image::DynamicImage;
use image::imageops::FilterType;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use std::path::PathBuf;
use std::time::Duration;

const APP_TITLE_WITH_VERSION: &str = "minipod v0.1.0  ";

/// What the footer input line is showing, if anything.
pub enum InputPrompt<'a> {
    None,
    Search(&'a str),
    Command(&'a str),
    Confirm(&'a str),
}

#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    panel_bg: Color,
    panel_alt_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    selected_bg: Color,
}

fn palette() -> Palette {
    Palette {
        bg: Color::Rgb(10, 15, 24),
        panel_bg: Color::Rgb(19, 29, 43),
        panel_alt_bg: Color::Rgb(24, 38, 58),
        border: Color::Rgb(69, 121, 176),
        text: Color::Rgb(214, 228, 248),
        muted: Color::Rgb(149, 173, 204),
        accent: Color::Rgb(100, 203, 184),
        alert: Color::Rgb(249, 174, 88),
        selected_bg: Color::Rgb(34, 55, 82),
    }
}

/// Decoded cover art for the running track. Decoding happens once per track
/// change, not per frame.
#[derive(Default)]
pub struct CoverArt {
    path: Option<PathBuf>,
    image: Option<DynamicImage>,
}

impl CoverArt {
    pub fn update(&mut self, now_playing: Option<&NowPlaying>) {
        let Some(playing) = now_playing else {
            self.path = None;
            self.image = None;
            return;
        };
        if self.path.as_deref() == Some(playing.path.as_path()) {
            return;
        }

        self.path = Some(playing.path.clone());
        self.image = playing
            .metadata
            .cover_art
            .as_deref()
            .and_then(|bytes| image::load_from_memory(bytes).ok());
    }

    /// Renders the art into half-block lines, two pixel rows per cell.
    fn lines(&self, width: u16, height: u16) -> Vec<Line<'static>> {
        let Some(image) = &self.image else {
            return Vec::new();
        };
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let resized = image.resize_exact(
            u32::from(width),
            u32::from(height) * 2,
            FilterType::Triangle,
        );
        let rgb = resized.to_rgb8();

        let mut lines = Vec::with_capacity(usize::from(height));
        for row in 0..u32::from(height) {
            let mut spans = Vec::with_capacity(usize::from(width));
            for col in 0..u32::from(width) {
                let top = rgb.get_pixel(col, row * 2);
                let bottom = rgb.get_pixel(col, row * 2 + 1);
                spans.push(Span::styled(
                    "\u{2580}",
                    Style::default()
                        .fg(Color::Rgb(top[0], top[1], top[2]))
                        .bg(Color::Rgb(bottom[0], bottom[1], bottom[2])),
                ));
            }
            lines.push(Line::from(spans));
        }
        lines
    }
}

pub fn playlist_rect(area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(vertical[1]);

    body[0]
}

pub fn draw(
    frame: &mut Frame,
    core: &PlayerCore,
    audio: &dyn AudioEngine,
    cover: &CoverArt,
    prompt: &InputPrompt,
) {
    let colors = palette();
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    draw_header(frame, core, &colors, vertical[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(vertical[1]);

    draw_playlist(frame, core, &colors, body[0]);
    draw_now_playing(frame, core, cover, &colors, body[1]);
    draw_timeline(frame, core, audio, &colors, vertical[2]);
    draw_footer(frame, core, prompt, &colors, vertical[3]);
}

fn draw_header(frame: &mut Frame, core: &PlayerCore, colors: &Palette, area: Rect) {
    frame.render_widget(
        panel_block("Status", colors.panel_bg, colors.text, colors.border),
        area,
    );

    let inner = area.inner(Margin {
        vertical: 0,
        horizontal: 1,
    });

    let view_count = if core.search_term.is_empty() {
        format!("Tracks {}", core.view.len())
    } else {
        format!("Tracks {}/{}", core.view.len(), core.master().len())
    };
    let state_label = match core.playback_state {
        PlaybackState::Playing => "Playing",
        PlaybackState::Paused => "Paused",
        PlaybackState::Stopped => "Stopped",
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            APP_TITLE_WITH_VERSION,
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(view_count, Style::default().fg(colors.text)),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(state_label, Style::default().fg(colors.alert)),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(
            format!(
                "Shuffle {}",
                if core.shuffle { "on" } else { "off" }
            ),
            Style::default().fg(colors.text),
        ),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(
            format!("Repeat {}", core.repeat_mode.label()),
            Style::default().fg(colors.text),
        ),
    ]));
    frame.render_widget(header, inner);
}

fn draw_playlist(frame: &mut Frame, core: &PlayerCore, colors: &Palette, area: Rect) {
    let items: Vec<ListItem> = core
        .view
        .iter()
        .enumerate()
        .map(|(position, path)| {
            let marker = if core.current_index == Some(position) {
                "  > "
            } else {
                "    "
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(colors.accent)),
                Span::styled(library::basename(path), Style::default().fg(colors.text)),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select((!core.view.is_empty()).then_some(core.selected));

    let title = if core.search_term.is_empty() {
        String::from("Playlist")
    } else {
        format!("Playlist / \"{}\"", core.search_term)
    };

    let list = List::new(items)
        .block(panel_block(
            &title,
            colors.panel_bg,
            colors.text,
            colors.border,
        ))
        .highlight_style(
            Style::default()
                .bg(colors.selected_bg)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_now_playing(
    frame: &mut Frame,
    core: &PlayerCore,
    cover: &CoverArt,
    colors: &Palette,
    area: Rect,
) {
    frame.render_widget(
        panel_block("Now Playing", colors.panel_alt_bg, colors.text, colors.border),
        area,
    );
    let inner = area.inner(Margin {
        vertical: 1,
        horizontal: 2,
    });

    let shown = core.now_playing.as_ref().or(core.preview.as_ref());
    let heading = if core.now_playing.is_some() {
        "Now"
    } else {
        "Selected"
    };

    let mut lines = match shown {
        Some(entry) => vec![
            Line::from(vec![
                Span::styled(
                    heading,
                    Style::default()
                        .fg(colors.accent)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("  {}", entry.metadata.title),
                    Style::default().fg(colors.text),
                ),
            ]),
            Line::from(Span::styled(
                format!("Artist  {}", entry.metadata.artist),
                Style::default().fg(colors.muted),
            )),
            Line::from(Span::styled(
                format!("Album   {}", entry.metadata.album),
                Style::default().fg(colors.muted),
            )),
            Line::from(Span::styled(
                format!(
                    "Length  {}",
                    format_duration(Duration::from_secs(u64::from(
                        entry.metadata.duration_seconds
                    )))
                ),
                Style::default().fg(colors.muted),
            )),
            Line::from(""),
        ],
        None => vec![Line::from(Span::styled(
            "Nothing queued",
            Style::default().fg(colors.muted),
        ))],
    };

    let art_height = inner.height.saturating_sub(lines.len() as u16);
    let art_width = inner.width.min(art_height.saturating_mul(2));
    lines.extend(cover.lines(art_width, art_height));

    let info = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(info, inner);
}

fn draw_timeline(
    frame: &mut Frame,
    core: &PlayerCore,
    audio: &dyn AudioEngine,
    colors: &Palette,
    area: Rect,
) {
    let timeline = Paragraph::new(Span::styled(
        timeline_line(core, audio, 26, 14),
        Style::default().fg(colors.text),
    ))
    .block(panel_block(
        "Timeline",
        colors.panel_bg,
        colors.text,
        colors.border,
    ))
    .wrap(Wrap { trim: true });
    frame.render_widget(timeline, area);
}

fn draw_footer(
    frame: &mut Frame,
    core: &PlayerCore,
    prompt: &InputPrompt,
    colors: &Palette,
    area: Rect,
) {
    let line = match prompt {
        InputPrompt::Search(buffer) => Line::from(vec![
            Span::styled(
                "Search: ",
                Style::default()
                    .fg(colors.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("{buffer}_"), Style::default().fg(colors.text)),
        ]),
        InputPrompt::Command(buffer) => Line::from(vec![
            Span::styled(
                ":",
                Style::default()
                    .fg(colors.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("{buffer}_"), Style::default().fg(colors.text)),
        ]),
        InputPrompt::Confirm(question) => Line::from(Span::styled(
            format!("{question} [y/n]"),
            Style::default()
                .fg(colors.alert)
                .add_modifier(Modifier::BOLD),
        )),
        InputPrompt::None => Line::from(vec![
            Span::styled(
                "Keys: Enter play, Space pause, n next, b previous, h shuffle, r repeat, / search, d remove, : command, Ctrl+C quit",
                Style::default().fg(colors.muted),
            ),
            Span::styled("  |  ", Style::default().fg(colors.muted)),
            Span::styled(core.status.as_str(), Style::default().fg(colors.text)),
        ]),
    };

    let footer = Paragraph::new(line).block(panel_block(
        "Message",
        colors.panel_bg,
        colors.text,
        colors.border,
    ));
    frame.render_widget(footer, area);
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn timeline_line(
    core: &PlayerCore,
    audio: &dyn AudioEngine,
    timeline_bar_width: usize,
    volume_bar_width: usize,
) -> String {
    let elapsed = audio.position().unwrap_or(Duration::ZERO);

    // Prefer the engine's decoded duration; tagged duration fills in when
    // the decoder does not know (e.g. headless mode).
    let total = audio.duration().or_else(|| {
        core.now_playing
            .as_ref()
            .map(|playing| Duration::from_secs(u64::from(playing.metadata.duration_seconds)))
            .filter(|duration| !duration.is_zero())
    });
    let ratio = total.and_then(|duration| {
        let total_secs = duration.as_secs_f64();
        (total_secs > 0.0).then_some((elapsed.as_secs_f64() / total_secs).clamp(0.0, 1.0))
    });

    let volume_percent = (audio.volume() * 100.0).round() as u16;
    let volume_ratio = f64::from(audio.volume().clamp(0.0, 1.0));

    format!(
        "{} / {} {}  |  Vol {} {:>3}%  +/- adjust",
        format_duration(elapsed),
        total
            .map(format_duration)
            .unwrap_or_else(|| String::from("--:--")),
        progress_bar(ratio, timeline_bar_width),
        progress_bar(Some(volume_ratio), volume_bar_width),
        volume_percent
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_format_as_minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3599)), "59:59");
    }

    #[test]
    fn progress_bar_clamps_out_of_range_ratios() {
        assert_eq!(progress_bar(Some(0.0), 4), "[----]");
        assert_eq!(progress_bar(Some(1.5), 4), "[####]");
        assert_eq!(progress_bar(None, 4), "[----]");
        assert_eq!(progress_bar(Some(0.5), 4), "[##--]");
    }
}
