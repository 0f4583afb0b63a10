use crate::config::{Paths, Settings};
use crate::fallback;
use crate::input::{classify, collect_keys_nonblocking, Command, EditorEvent, LineEditor, UserInput};
use crate::items::ItemCatalog;
use crate::llm::{LlmClient, ReplySource, Responder};
use crate::model::Sender;
use crate::reply::{PetAction, PetReply};
use crate::render::{draw_screen, Terminal, View};
use crate::sim::{GameEngine, SleepMode};
use crate::storage::{Snapshot, StateStore};
use crate::task::ReplyTask;
use anyhow::Result;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const FRAME: Duration = Duration::from_millis(33);

/// Messages funnelled into the loop that owns the engine.
#[derive(Clone, Debug)]
pub(crate) enum Cmd {
    Tick,
    Autosave,
    Saved(bool),
    ReplySettled {
        id: u64,
        reply: PetReply,
        source: ReplySource,
    },
}

struct App {
    engine: GameEngine,
    responder: Arc<Responder>,
    reply_budget: Duration,
    tx: mpsc::Sender<Cmd>,
    tasks: Vec<ReplyTask>,
    next_task_id: u64,
    editor: LineEditor,
    notices: VecDeque<String>,
    action: PetAction,
    offline: bool,
    should_quit: bool,
}

pub(crate) async fn run(settings: Settings, paths: &Paths) -> Result<()> {
    let store = Arc::new(StateStore::new(&paths.data_dir)?);
    let items_path = settings
        .items_path
        .clone()
        .unwrap_or_else(|| paths.items_path.clone());
    let catalog = Arc::new(ItemCatalog::load(&items_path));
    let engine = GameEngine::new(&settings, catalog, store, Utc::now());

    let responder = Arc::new(Responder::new(LlmClient::from_config(&settings.llm)?));
    let llm = &settings.llm;
    let reply_budget =
        Duration::from_secs(llm.timeout_s.max(1) * (u64::from(llm.max_retries) + 1) + 1);

    let (tx, mut rx) = mpsc::channel::<Cmd>(32);
    let game = &settings.game;
    spawn_driver(tx.clone(), Cmd::Tick, Duration::from_secs(game.tick_interval_s.max(1)));
    spawn_driver(
        tx.clone(),
        Cmd::Autosave,
        Duration::from_secs(game.autosave_interval_s.max(1)),
    );

    let mut app = App::new(engine, responder, reply_budget, tx);
    app.start();

    let mut term = Terminal::begin()?;
    let result = app.event_loop(&mut term, &mut rx).await;
    app.shutdown();
    term.end()?;
    result
}

fn spawn_driver(tx: mpsc::Sender<Cmd>, cmd: Cmd, every: Duration) {
    tokio::spawn(async move {
        // first fire one period from now, not immediately
        let mut t = interval_at(Instant::now() + every, every);
        t.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            t.tick().await;
            if tx.send(cmd.clone()).await.is_err() {
                break;
            }
        }
    });
}

impl App {
    fn new(
        engine: GameEngine,
        responder: Arc<Responder>,
        reply_budget: Duration,
        tx: mpsc::Sender<Cmd>,
    ) -> Self {
        Self {
            offline: !responder.is_online(),
            engine,
            responder,
            reply_budget,
            tx,
            tasks: Vec::new(),
            next_task_id: 0,
            editor: LineEditor::default(),
            notices: VecDeque::new(),
            action: PetAction::Smile,
            should_quit: false,
        }
    }

    fn start(&mut self) {
        let now = Utc::now();
        self.notice(if self.offline {
            "Offline mode (AI unavailable)"
        } else {
            "AI connected!"
        });
        let greeting = fallback::greeting(self.engine.variety());
        self.pet_says(greeting);
        log::info!("session started at {now}");
    }

    async fn event_loop(&mut self, term: &mut Terminal, rx: &mut mpsc::Receiver<Cmd>) -> Result<()> {
        let mut full_redraw = true;
        while !self.should_quit {
            while let Ok(cmd) = rx.try_recv() {
                self.handle_cmd(cmd);
            }

            if term.resize_if_needed()? {
                full_redraw = true;
            }
            self.draw(term);
            term.present(!full_redraw)?;
            full_redraw = false;

            for key in collect_keys_nonblocking(FRAME)? {
                match self.editor.handle_key(key) {
                    Some(EditorEvent::Submit(line)) => self.handle_line(&line),
                    Some(EditorEvent::Quit) => {
                        if !self.engine.save(Utc::now()) {
                            log::warn!("final save failed");
                        }
                        self.should_quit = true;
                    }
                    None => {}
                }
                if self.should_quit {
                    break;
                }
            }
            // let drivers and reply tasks make progress between frames
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn draw(&self, term: &mut Terminal) {
        let notices: Vec<String> = self.notices.iter().cloned().collect();
        let state = self.engine.state();
        let view = View {
            pet_name: self.engine.pet_name(),
            stats: &state.stats,
            action: self.action,
            offline: self.offline,
            notices: &notices,
            chat: &state.chat_history,
            input: self.editor.text(),
        };
        draw_screen(&mut term.cur, &view);
    }

    fn handle_cmd(&mut self, cmd: Cmd) {
        let now = Utc::now();
        match cmd {
            Cmd::Tick => {
                let report = self.engine.tick(now);
                if let Some(snapshot) = report.autosave {
                    self.save_in_background(snapshot);
                }
                self.pull_notifications();
                let variety = self.engine.variety();
                if !self.engine.state().stats.sleeping && variety % 10 == 0 {
                    let thought = fallback::random_thought(&self.engine.state().stats, variety / 10);
                    self.pet_says(thought);
                }
            }
            Cmd::Autosave => {
                let snapshot = self.engine.take_autosave(now);
                self.save_in_background(snapshot);
            }
            Cmd::Saved(ok) => self.notice(if ok { "Game saved" } else { "Autosave failed!" }),
            Cmd::ReplySettled { id, reply, source } => {
                for t in self.tasks.iter_mut().filter(|t| t.id() == id) {
                    t.settle();
                }
                self.tasks.retain(|t| t.id() != id);
                self.offline = source == ReplySource::Fallback;
                self.pet_says(reply);
            }
        }
    }

    /// Write off the loop thread. The store drops the write if a newer
    /// snapshot got there first.
    fn save_in_background(&self, snapshot: Snapshot) {
        let store = Arc::clone(self.engine.store());
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let ok = tokio::task::spawn_blocking(move || store.save(&snapshot))
                .await
                .unwrap_or(false);
            tx.send(Cmd::Saved(ok)).await.ok();
        });
    }

    fn handle_line(&mut self, line: &str) {
        let Some(input) = classify(line) else {
            return;
        };
        let now = Utc::now();
        self.engine.add_chat_message(Sender::User, line.trim(), now);

        match input {
            UserInput::Command(cmd) => {
                let resp = self.engine.execute(&cmd, now);
                self.engine.add_chat_message(Sender::System, resp.text.as_str(), now);
                if let Command::Unknown(_) = cmd {
                    let confused = fallback::error_response(self.engine.variety());
                    self.pet_says(confused);
                } else if let Some(action) = reaction(&cmd, &resp.text) {
                    self.action = action;
                }
                self.pull_notifications();
                if resp.quit {
                    self.should_quit = true;
                }
            }
            UserInput::Chat(text) => {
                self.tasks.retain(ReplyTask::is_pending);
                let id = self.next_task_id;
                self.next_task_id += 1;
                let ctx = self.engine.context(&text, now);
                let variety = self.engine.variety();
                self.tasks.push(ReplyTask::spawn(
                    id,
                    Arc::clone(&self.responder),
                    ctx,
                    variety,
                    self.reply_budget,
                    self.tx.clone(),
                ));
            }
        }
    }

    fn pet_says(&mut self, reply: PetReply) {
        self.action = reply.action;
        self.engine
            .add_chat_message(Sender::Pet, reply.say, Utc::now());
    }

    fn notice(&mut self, msg: impl Into<String>) {
        self.notices.push_back(msg.into());
        let max = self.engine.config().max_notifications.max(1);
        while self.notices.len() > max {
            self.notices.pop_front();
        }
    }

    fn pull_notifications(&mut self) {
        for n in self.engine.drain_notifications() {
            self.notice(n);
        }
    }

    fn shutdown(&mut self) {
        for t in &mut self.tasks {
            t.cancel();
        }
        self.tasks.clear();
        log::info!("session ended");
    }
}

/// Face shown right after a command, if it did something.
fn reaction(cmd: &Command, text: &str) -> Option<PetAction> {
    let applied = |prefix: &str| text.starts_with(prefix);
    match cmd {
        Command::Feed(_) if applied("Fed ") => Some(PetAction::Eat),
        Command::Clean(_) if applied("Cleaned with ") => Some(PetAction::Clean),
        Command::Play(_) if applied("Played with ") => Some(PetAction::Play),
        Command::Pet => Some(PetAction::Heart),
        Command::Sleep(SleepMode::On) => Some(PetAction::Sleeping),
        Command::Sleep(_) if applied("Pet woke up") => Some(PetAction::Wave),
        Command::Sleep(_) => Some(PetAction::Sleeping),
        _ => None,
    }
}
