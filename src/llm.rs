use crate::config::LlmConfig;
use crate::fallback;
use crate::reply::{GameContext, PetAction, PetReply};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const OLLAMA_BASE: &str = "http://localhost:11434/v1";
const CONTEXT_EVENTS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Provider {
    Deterministic,
    OpenAi,
    Ollama,
}

impl Provider {
    pub(crate) fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Provider::OpenAi,
            "ollama" => Provider::Ollama,
            "deterministic" | "" => Provider::Deterministic,
            other => {
                log::warn!("LLM provider '{other}' is not supported, running offline");
                Provider::Deterministic
            }
        }
    }
}

/// Where a reply came from. The UI shows an offline marker for fallbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReplySource {
    Llm,
    Fallback,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub(crate) struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    say: String,
    #[serde(default)]
    action: String,
}

impl LlmClient {
    /// `None` when the configuration asks for offline replies, or names a
    /// provider that cannot be used as configured.
    pub(crate) fn from_config(cfg: &LlmConfig) -> Result<Option<Self>> {
        let base = match Provider::from_name(&cfg.provider) {
            Provider::Deterministic => return Ok(None),
            Provider::OpenAi => {
                if cfg.api_key.is_none() {
                    log::warn!("provider openai needs OPENAI_API_KEY, running offline");
                    return Ok(None);
                }
                cfg.api_base.as_deref().unwrap_or(OPENAI_BASE)
            }
            Provider::Ollama => cfg.api_base.as_deref().unwrap_or(OLLAMA_BASE),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_s.max(1)))
            .build()
            .context("building HTTP client failed")?;
        Ok(Some(Self {
            http,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            max_retries: cfg.max_retries,
        }))
    }

    pub(crate) async fn pet_reply(&self, ctx: &GameContext) -> Result<PetReply> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt()},
                {"role": "user", "content": context_prompt(ctx)},
            ],
        });

        let mut last_err = anyhow!("no attempt made");
        for attempt in 0..=self.max_retries {
            match self.request_once(&body).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    log::warn!("LLM error (attempt {}): {e:#}", attempt + 1);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn request_once(&self, body: &serde_json::Value) -> Result<PetReply> {
        let mut req = self.http.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp: ChatResp = req
            .send()
            .await
            .context("completion request failed")?
            .error_for_status()
            .context("completion HTTP error")?
            .json()
            .await
            .context("completion JSON parse failed")?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("completion had no content"))?;
        parse_reply(&content)
    }
}

/// Pull the `{say, action}` object out of a model's text, tolerating code
/// fences or chatter around it.
pub(crate) fn parse_reply(content: &str) -> Result<PetReply> {
    let start = content.find('{').ok_or_else(|| anyhow!("no JSON object in reply"))?;
    let end = content.rfind('}').ok_or_else(|| anyhow!("no JSON object in reply"))?;
    if end < start {
        return Err(anyhow!("no JSON object in reply"));
    }
    let raw: RawReply =
        serde_json::from_str(&content[start..=end]).context("reply JSON parse failed")?;
    Ok(PetReply::new(&raw.say, PetAction::parse_lenient(&raw.action)))
}

pub(crate) fn system_prompt() -> String {
    let actions: Vec<&str> = PetAction::ALL.iter().map(|a| a.as_str()).collect();
    format!(
        "You are a tiny, adorable terminal pet. You live inside a computer terminal \
         and depend on your user for care.\n\n\
         PERSONALITY:\n\
         - cute, playful and affectionate\n\
         - short, simple sentences (12 words or fewer)\n\
         - react to your stats and recent events\n\
         - grateful when cared for, sad when neglected\n\n\
         Respond with a JSON object: {{\"say\": <spoken reply>, \"action\": <one allowed action>}}\n\
         ALLOWED ACTIONS: {}\n\n\
         Use EAT when fed, CLEAN when washed, PLAY when entertained, SAD/CRY when stats \
         are low, SLEEPING/NAP when tired, SICK when health is low, THANKS when the user \
         does something nice, CONFUSED when you don't understand.",
        actions.join(", ")
    )
}

fn condition(ctx: &GameContext) -> &'static str {
    let s = &ctx.stats;
    let avg = (s.hunger() + s.hygiene() + s.energy()) / 3.0;
    if avg < 20.0 {
        "terrible"
    } else if avg < 40.0 {
        "poor"
    } else if avg < 60.0 {
        "okay"
    } else if avg < 80.0 {
        "good"
    } else {
        "great"
    }
}

pub(crate) fn context_prompt(ctx: &GameContext) -> String {
    let s = &ctx.stats;
    let start = ctx.recent_events.len().saturating_sub(CONTEXT_EVENTS);
    let cond = condition(ctx);
    let info = json!({
        "current_stats": {
            "hunger": format!("{:.0}/100", s.hunger()),
            "hygiene": format!("{:.0}/100", s.hygiene()),
            "happiness": format!("{:.0}/100", s.happiness()),
            "energy": format!("{:.0}/100", s.energy()),
            "affection": format!("{:.0}/100", s.affection()),
            "health": format!("{:.0}/100", s.health()),
            "sleeping": s.sleeping,
        },
        "overall_condition": cond,
        "recent_events": &ctx.recent_events[start..],
        "last_user_said": ctx.last_user_input,
        "time_of_day": ctx.time_of_day.as_str(),
        "pet_name": ctx.pet_name,
    });
    let pretty = serde_json::to_string_pretty(&info).unwrap_or_else(|_| info.to_string());
    format!(
        "CURRENT CONTEXT:\n{pretty}\n\nBased on this context, respond as {}. \
         Your condition is {cond}. React appropriately to your stats and recent events.",
        ctx.pet_name
    )
}

/// Model first, rules second. Never fails.
pub(crate) struct Responder {
    client: Option<LlmClient>,
}

impl Responder {
    pub(crate) fn new(client: Option<LlmClient>) -> Self {
        Self { client }
    }

    pub(crate) fn offline() -> Self {
        Self { client: None }
    }

    pub(crate) fn is_online(&self) -> bool {
        self.client.is_some()
    }

    pub(crate) async fn respond(&self, ctx: &GameContext, variety: u64) -> (PetReply, ReplySource) {
        if let Some(client) = &self.client {
            match client.pet_reply(ctx).await {
                Ok(reply) => return (reply, ReplySource::Llm),
                Err(e) => log::warn!("LLM unavailable, using fallback reply: {e:#}"),
            }
        }
        (fallback::reply(ctx, variety), ReplySource::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PetStats;
    use crate::reply::TimeOfDay;

    fn ctx() -> GameContext {
        GameContext {
            stats: PetStats::default(),
            recent_events: (0..9).map(|i| format!("[08:0{i}] event {i}")).collect(),
            last_user_input: "hello".into(),
            time_of_day: TimeOfDay::Morning,
            pet_name: "Mochi".into(),
        }
    }

    #[test]
    fn parses_fenced_json_and_sanitises() {
        let r = parse_reply("```json\n{\"say\": \"  yum yum  \", \"action\": \"eat\"}\n```").unwrap();
        assert_eq!(r, PetReply::new("yum yum", PetAction::Eat));

        let r = parse_reply(r#"{"say": "", "action": "BREAKDANCE"}"#).unwrap();
        assert_eq!(r.say, "hi!");
        assert_eq!(r.action, PetAction::Smile);

        assert!(parse_reply("no json here").is_err());
        assert!(parse_reply("} backwards {").is_err());
    }

    #[test]
    fn context_prompt_carries_the_last_six_events() {
        let p = context_prompt(&ctx());
        assert!(p.contains("event 8"));
        assert!(p.contains("event 3"));
        assert!(!p.contains("event 2"));
        assert!(p.contains("Mochi"));
        assert!(p.contains("\"time_of_day\": \"morning\""));
        assert!(p.contains("Your condition is okay"));
    }

    #[test]
    fn system_prompt_lists_every_action() {
        let p = system_prompt();
        for a in PetAction::ALL {
            assert!(p.contains(a.as_str()), "{a}");
        }
    }

    #[test]
    fn offline_configurations_build_no_client() {
        let mut cfg = LlmConfig::default();
        assert!(LlmClient::from_config(&cfg).unwrap().is_none());
        cfg.provider = "openai".into();
        assert!(LlmClient::from_config(&cfg).unwrap().is_none());
        cfg.provider = "carrier-pigeon".into();
        assert!(LlmClient::from_config(&cfg).unwrap().is_none());
        cfg.provider = "ollama".into();
        let client = LlmClient::from_config(&cfg).unwrap().unwrap();
        assert_eq!(client.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn unreachable_model_falls_back() {
        let cfg = LlmConfig {
            provider: "ollama".into(),
            api_base: Some("http://127.0.0.1:9/v1".into()),
            timeout_s: 1,
            max_retries: 0,
            ..LlmConfig::default()
        };
        let responder = Responder::new(LlmClient::from_config(&cfg).unwrap());
        assert!(responder.is_online());
        let (reply, source) = responder.respond(&ctx(), 5).await;
        assert_eq!(source, ReplySource::Fallback);
        assert_eq!(reply, fallback::reply(&ctx(), 5));
    }

    #[tokio::test]
    async fn offline_responder_uses_rules() {
        let (reply, source) = Responder::offline().respond(&ctx(), 5).await;
        assert_eq!(source, ReplySource::Fallback);
        assert_eq!(reply.say, "doing okay");
    }
}
