use crate::model::{ChatEntry, PetStats, Sender, Stat};
use crate::reply::PetAction;
use crossterm::{
    cursor, execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }

    fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }

    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.cells.fill(Cell::default());
    }

    #[cfg(test)]
    pub(crate) fn row_text(&self, y: u16) -> String {
        let start = self.idx(0, y);
        self.cells[start..start + self.w as usize]
            .iter()
            .map(|c| c.ch)
            .collect::<String>()
            .trim_end()
            .to_string()
    }
}

pub(crate) struct Terminal {
    out: io::Stdout,
    cols: u16,
    rows: u16,
    prev: CellBuffer,
    pub(crate) cur: CellBuffer,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            terminal::Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;

        let (cols, rows) = terminal::size()?;
        Ok(Self {
            out,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    /// Returns true when the buffers were rebuilt and a full redraw is due.
    pub(crate) fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if c == self.cols && r == self.rows {
            return Ok(false);
        }
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::new(c, r);
        self.cur = CellBuffer::new(c, r);
        queue!(self.out, Clear(ClearType::All))?;
        Ok(true)
    }

    pub(crate) fn present(&mut self, diff_only: bool) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;

        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if diff_only && c == self.prev.cells[i] {
                    continue;
                }

                queue!(self.out, cursor::MoveTo(x, y))?;

                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }

                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

pub(crate) fn draw_text(buf: &mut CellBuffer, x: u16, y: u16, s: &str, fg: Color) {
    for (i, ch) in s.chars().enumerate() {
        let xx = x.saturating_add(i as u16);
        if xx >= buf.w || y >= buf.h {
            break;
        }
        buf.set(
            xx,
            y,
            Cell {
                ch,
                fg,
                bg: Color::Black,
            },
        );
    }
}

fn bar(value01: f64, width: usize) -> String {
    let v = value01.clamp(0.0, 1.0);
    let fill = (v * width as f64 + 0.5) as usize;
    let mut s = String::new();
    s.push('[');
    for i in 0..width {
        s.push(if i < fill { '█' } else { ' ' });
    }
    s.push(']');
    s
}

fn bar_color(v: f64) -> Color {
    if v < 20.0 {
        Color::Red
    } else if v < 40.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

pub(crate) fn face(action: PetAction) -> [&'static str; 3] {
    use PetAction::*;
    match action {
        Smile => ["  .-----.  ", " | o   o | ", " |  \\_/  | "],
        Laugh => ["  .-----.  ", " | ^   ^ | ", " | \\___/ | "],
        Blush => ["  .-----.  ", " |~o   o~| ", " |  \\_/  | "],
        Heart => ["  .-----.  ", " | <3 <3 | ", " |  ^_^  | "],
        Wave => ["  .-----. o", " | o   o |/", " |  \\_/  | "],
        Wiggle => [" ~.-----.~ ", "~| o   o |~", " |  \\_/  | "],
        Jump => ["  .-----.  ", " | o   o | ", "/|  \\_/  |\\"],
        Eat => ["  .-----.  ", " | o   o | ", " |  \\o/  |*"],
        Clean => [" o.-----.o ", "o| o   o |o", " |  \\_/  | "],
        Play => ["  .-----. *", " | O   O | ", " |  \\^/  | "],
        Nap => ["  .-----.  ", " | -   - | ", " |  \\_/  | "],
        Sleeping => ["  .-----. Z", " | -   - |z", " |  \\_/  | "],
        Sad => ["  .-----.  ", " | o   o | ", " |  /-\\  | "],
        Cry => ["  .-----.  ", "'| o   o |'", " |  /-\\  | "],
        Sick => ["  .-----.  ", " | x   x | ", " |  /o\\  | "],
        Heal => [" +.-----.+ ", " | o   o | ", " |  \\_/  | "],
        Confused => ["? .-----. ?", " | o   O | ", " |  \\_?  | "],
        Think => [". .-----.  ", "o| o   o | ", " |  \\_/  | "],
        Surprised => ["  .-----.  ", " | O   O | ", " |   o   | "],
        Thanks => ["  .-----.  ", " | ^   ^ | ", " | thanks| "],
    }
}

/// Everything one frame shows. Built fresh by the app each frame.
pub(crate) struct View<'a> {
    pub(crate) pet_name: &'a str,
    pub(crate) stats: &'a PetStats,
    pub(crate) action: PetAction,
    pub(crate) offline: bool,
    pub(crate) notices: &'a [String],
    pub(crate) chat: &'a [ChatEntry],
    pub(crate) input: &'a str,
}

pub(crate) fn draw_screen(buf: &mut CellBuffer, v: &View<'_>) {
    buf.clear();
    let fg = Color::White;
    let dim = Color::DarkGrey;

    let mut title = format!("Termagatchi  |  {}", v.pet_name);
    if v.stats.sleeping {
        title.push_str("  |  asleep");
    }
    draw_text(buf, 1, 0, &title, Color::Cyan);
    if v.offline {
        let tag = "[offline]";
        let x = buf.w.saturating_sub(tag.len() as u16 + 1);
        draw_text(buf, x, 0, tag, Color::Yellow);
    }

    for (i, stat) in Stat::ALL.iter().enumerate() {
        let val = v.stats.get(*stat);
        let y = 2 + i as u16;
        let label = format!("{:<9} ", stat.label());
        draw_text(buf, 1, y, &label, fg);
        draw_text(buf, 11, y, &bar(val / 100.0, 16), bar_color(val));
        draw_text(buf, 30, y, &format!("{val:>5.1}"), fg);
    }

    // pet face and notices share the right half
    let right = 40;
    let sprite = if v.stats.sleeping {
        PetAction::Sleeping
    } else {
        v.action
    };
    for (i, line) in face(sprite).iter().enumerate() {
        draw_text(buf, right, 2 + i as u16, line, Color::Magenta);
    }
    draw_text(buf, right, 6, "Notices", dim);
    for (i, n) in v.notices.iter().enumerate() {
        draw_text(buf, right, 7 + i as u16, &format!("* {n}"), Color::Yellow);
    }

    // chat fills what is left above the input line
    let chat_top = 9 + v.notices.len().max(3) as u16;
    let input_y = buf.h.saturating_sub(2);
    let lines = chat_lines(v.chat, buf.w.saturating_sub(2) as usize);
    let room = input_y.saturating_sub(chat_top) as usize;
    let start = lines.len().saturating_sub(room);
    for (i, (text, color)) in lines[start..].iter().enumerate() {
        draw_text(buf, 1, chat_top + i as u16, text, *color);
    }

    draw_text(buf, 1, input_y, &format!("> {}_", v.input), fg);
    draw_text(
        buf,
        1,
        buf.h.saturating_sub(1),
        "/help for commands | type to chat | ctrl-c quit",
        dim,
    );
}

fn chat_lines(chat: &[ChatEntry], width: usize) -> Vec<(String, Color)> {
    let mut out = Vec::new();
    for entry in chat {
        let (who, color) = match entry.sender {
            Sender::User => ("you", Color::Cyan),
            Sender::Pet => ("pet", Color::Magenta),
            Sender::System => ("sys", Color::DarkGrey),
        };
        // system replies can be multi-line (status, help)
        for (i, part) in entry.message.lines().enumerate() {
            let prefix = if i == 0 { format!("{who}: ") } else { "     ".to_string() };
            let mut line = format!("{prefix}{part}");
            if width > 0 && line.chars().count() > width {
                line = line.chars().take(width).collect();
            }
            out.push((line, color));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PetState;
    use chrono::{TimeZone, Utc};

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(bar(0.5, 4), "[██  ]");
        assert_eq!(bar(2.0, 2), "[██]");
        assert_eq!(bar(-1.0, 2), "[  ]");
    }

    #[test]
    fn every_action_has_a_face() {
        for a in PetAction::ALL {
            assert_eq!(face(a).len(), 3);
        }
    }

    #[test]
    fn screen_shows_stats_chat_and_offline_marker() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut st = PetState::new(t);
        st.add_chat_message(Sender::User, "/status", t);
        st.add_chat_message(Sender::System, "Hunger: 50/100\nHygiene: 50/100", t);
        st.add_chat_message(Sender::Pet, "hi there!", t);
        let notices = vec!["Fed Kibble".to_string()];

        let mut buf = CellBuffer::new(80, 24);
        draw_screen(
            &mut buf,
            &View {
                pet_name: "Mochi",
                stats: &st.stats,
                action: PetAction::Wave,
                offline: true,
                notices: &notices,
                chat: &st.chat_history,
                input: "/fe",
            },
        );

        assert!(buf.row_text(0).contains("Mochi"));
        assert!(buf.row_text(0).ends_with("[offline]"));
        assert!(buf.row_text(2).starts_with(" Hunger"));
        assert!(buf.row_text(7).contains("Health"));
        assert!(buf.row_text(7).contains("* Fed Kibble"));
        let all: Vec<String> = (0..24).map(|y| buf.row_text(y)).collect();
        assert!(all.iter().any(|l| l.contains("pet: hi there!")));
        assert!(all.iter().any(|l| l.contains("     Hygiene: 50/100")));
        assert_eq!(all[22], " > /fe_");
    }
}
