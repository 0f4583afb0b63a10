use crate::sim::SleepMode;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::Duration;

const HISTORY_MAX: usize = 50;
const LINE_MAX: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Feed(Option<String>),
    Clean(Option<String>),
    Play(Option<String>),
    Sleep(SleepMode),
    Pet,
    Status,
    Save,
    Quit,
    Help,
    Unknown(String),
}

impl Command {
    fn parse(verb: &str, arg: Option<&str>) -> Self {
        let item = || arg.map(str::to_string);
        match verb {
            "feed" => Command::Feed(item()),
            "clean" => Command::Clean(item()),
            "play" => Command::Play(item()),
            "sleep" => Command::Sleep(SleepMode::from_arg(arg)),
            "pet" => Command::Pet,
            "status" => Command::Status,
            "save" => Command::Save,
            "quit" | "exit" => Command::Quit,
            "help" => Command::Help,
            other => Command::Unknown(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum UserInput {
    Command(Command),
    Chat(String),
}

/// `/verb [arg]` is a command, anything else non-blank is chat.
pub(crate) fn classify(line: &str) -> Option<UserInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(UserInput::Chat(line.to_string()));
    };
    let mut parts = rest.split_whitespace();
    let verb = parts.next()?.to_lowercase();
    Some(UserInput::Command(Command::parse(&verb, parts.next())))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum EditorEvent {
    Submit(String),
    Quit,
}

/// Single-line prompt with a small recall history.
#[derive(Default)]
pub(crate) struct LineEditor {
    buf: String,
    history: Vec<String>,
    recall: Option<usize>,
}

impl LineEditor {
    pub(crate) fn text(&self) -> &str {
        &self.buf
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) -> Option<EditorEvent> {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d'))
        {
            return Some(EditorEvent::Quit);
        }
        match key.code {
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.buf);
                self.recall = None;
                if line.trim().is_empty() {
                    return None;
                }
                if self.history.last() != Some(&line) {
                    self.history.push(line.clone());
                    if self.history.len() > HISTORY_MAX {
                        self.history.remove(0);
                    }
                }
                Some(EditorEvent::Submit(line))
            }
            KeyCode::Backspace => {
                self.buf.pop();
                None
            }
            KeyCode::Esc => {
                self.buf.clear();
                self.recall = None;
                None
            }
            KeyCode::Up => {
                if self.history.is_empty() {
                    return None;
                }
                let idx = match self.recall {
                    Some(i) => i.saturating_sub(1),
                    None => self.history.len() - 1,
                };
                self.recall = Some(idx);
                self.buf = self.history[idx].clone();
                None
            }
            KeyCode::Down => {
                match self.recall {
                    Some(i) if i + 1 < self.history.len() => {
                        self.recall = Some(i + 1);
                        self.buf = self.history[i + 1].clone();
                    }
                    _ => {
                        self.recall = None;
                        self.buf.clear();
                    }
                }
                None
            }
            KeyCode::Char(ch) => {
                if !ch.is_control() && self.buf.chars().count() < LINE_MAX {
                    self.buf.push(ch);
                }
                None
            }
            _ => None,
        }
    }
}

pub(crate) fn collect_keys_nonblocking(max_wait: Duration) -> anyhow::Result<Vec<KeyEvent>> {
    let mut out = Vec::new();

    // first poll may wait; the rest only drain what is already queued
    let mut timeout = max_wait;
    while event::poll(timeout)? {
        if let Event::Key(k) = event::read()? {
            if k.kind == KeyEventKind::Press || k.kind == KeyEventKind::Repeat {
                out.push(k);
                if out.len() >= 32 {
                    break;
                }
            }
        }
        timeout = Duration::ZERO;
    }
    Ok(out)
}
