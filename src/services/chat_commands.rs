//! Chat Commands
//!
//! Turns stream chat traffic into bus requests.
//!
//! | Input                              | Published                                  |
//! |------------------------------------|--------------------------------------------|
//! | `!so` / `!shoutout <user>`         | `UILog`, `SpeakRequest`                    |
//! | `!search <words>`                  | `UILog`, `SearchRequest` (`twitch_command`)|
//! | `!ask` / `!penny <words>`          | `AIQuery`                                  |
//! | message mentioning the bot         | `UILog`, `AIQuery` (`twitch_chat`)         |
//! | platform event (`TwitchUser`)      | `AIQuery` (`twitch_event`)                 |
//! | `SearchResult` from a chat command | `AIQuery` or an apology `SpeakRequest`     |

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::constants::LOG_PREVIEW_CHARS;
use crate::domain::config::ChatConfig;
use crate::eventing::{
    async_handler, AiQuery, AsyncHandler, Event, EventBus, EventKind, SearchRequest, SearchResult,
    SpeakRequest, TwitchMessage, TwitchUser, UiLog,
};
use crate::helpers::preview;
use crate::services::service::{Service, Startable, Stoppable};

/// Source tag for searches started from chat
pub const SEARCH_SOURCE_CHAT: &str = "twitch_command";
/// Source tag for bot mentions
pub const AI_SOURCE_CHAT: &str = "twitch_chat";
/// Source tag for platform events
pub const AI_SOURCE_EVENT: &str = "twitch_event";

/// Pure mapping from chat input to the events it should produce
#[derive(Debug, Clone)]
pub struct ChatRouter {
    bot_name: String,
    prefix: String,
}

impl ChatRouter {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            bot_name: config.bot_name.to_lowercase(),
            prefix: config.command_prefix.clone(),
        }
    }

    /// Events for one chat message, in publish order
    pub fn on_message(&self, msg: &TwitchMessage) -> Vec<Event> {
        let content = msg.message.trim();
        tracing::debug!(user = %msg.username, message = %preview(content, LOG_PREVIEW_CHARS), "Chat message");

        if !self.prefix.is_empty() && content.starts_with(&self.prefix) {
            return self.on_command(&msg.username, content);
        }

        if !self.bot_name.is_empty() && content.to_lowercase().contains(&self.bot_name) {
            return vec![
                UiLog::info(format!("{} mentioned {} in chat", msg.username, self.bot_name)).into(),
                AiQuery::new(content)
                    .with_instruction(format!("User {} said in chat: ", msg.username))
                    .with_source(AI_SOURCE_CHAT)
                    .into(),
            ];
        }

        Vec::new()
    }

    fn on_command(&self, user: &str, content: &str) -> Vec<Event> {
        let Some(parts) = shlex::split(content) else {
            tracing::warn!(message = %content, "Could not parse command");
            return Vec::new();
        };
        let Some((head, args)) = parts.split_first() else {
            return Vec::new();
        };
        let command = head.strip_prefix(&self.prefix).unwrap_or(head).to_lowercase();

        match command.as_str() {
            "so" | "shoutout" => match args.first() {
                Some(target) => {
                    let target = target.trim_start_matches('@');
                    vec![
                        UiLog::info(format!("Shoutout command for {target} from {user}")).into(),
                        SpeakRequest::new(format!(
                            "Go check out {target}! They are awesome, give them a follow."
                        ))
                        .into(),
                    ]
                }
                None => vec![SpeakRequest::new(format!(
                    "To shout someone out, {user}, please tell me their username, like {}shoutout awesome_streamer.",
                    self.prefix
                ))
                .into()],
            },
            "search" => {
                if args.is_empty() {
                    return vec![SpeakRequest::new(format!("What should I search for, {user}?")).into()];
                }
                let query = args.join(" ");
                let mut request = SearchRequest::new(query.as_str(), SEARCH_SOURCE_CHAT);
                request.original_user = Some(user.to_string());
                vec![
                    UiLog::info(format!("Search command for '{query}' from {user}")).into(),
                    request.into(),
                ]
            }
            "ask" | "penny" => {
                if args.is_empty() {
                    return vec![
                        SpeakRequest::new(format!("What would you like to ask, {user}?")).into(),
                    ];
                }
                vec![AiQuery::new(args.join(" "))
                    .with_instruction(format!("User {user} asked: "))
                    .into()]
            }
            other => {
                tracing::debug!(command = other, "Unknown chat command");
                Vec::new()
            }
        }
    }

    /// Events for a platform event such as a sub or raid
    pub fn on_platform_event(&self, event: &TwitchUser) -> Vec<Event> {
        let user = if event.username.is_empty() {
            "someone"
        } else {
            event.username.as_str()
        };
        tracing::info!(event_type = %event.event_type, user, "Platform event");

        let mut description = format!("{} from {user}", event.event_type);
        for (key, value) in &event.details {
            description.push_str(&format!(", {key}: {value}"));
        }

        vec![AiQuery::new(description)
            .with_instruction("React to this stream event in your voice: ")
            .with_source(AI_SOURCE_EVENT)
            .into()]
    }

    /// Events for a search result; only results of chat searches are handled
    pub fn on_search_result(&self, result: &SearchResult) -> Vec<Event> {
        if result.source != SEARCH_SOURCE_CHAT {
            return Vec::new();
        }

        let user = result.original_user.as_deref().unwrap_or("someone");
        let top = match (&result.error, result.results.first()) {
            (None, Some(top)) => top,
            _ => {
                return vec![SpeakRequest::new(format!(
                    "Sorry {user}, I couldn't find anything about {}.",
                    result.query
                ))
                .into()];
            }
        };

        let title: &str = if top.title.is_empty() { "Unknown Title" } else { &top.title };
        let snippet: &str = if top.snippet.is_empty() {
            "No description available."
        } else {
            &top.snippet
        };

        vec![AiQuery::new(snippet)
            .with_instruction(format!(
                "User '{user}' asked to search for '{}'. The top result is '{title}'. Briefly summarize this snippet for them in your voice:",
                result.query
            ))
            .into()]
    }

    fn route(&self, event: &Event) -> Vec<Event> {
        match event {
            Event::TwitchMessage(msg) => self.on_message(msg),
            Event::TwitchUser(user) => self.on_platform_event(user),
            Event::SearchResult(result) => self.on_search_result(result),
            _ => Vec::new(),
        }
    }
}

/// Chat interaction service
pub struct ChatCommands {
    bus: EventBus,
    router: ChatRouter,
    handler: Mutex<Option<AsyncHandler>>,
}

const ROUTED_KINDS: [EventKind; 3] = [
    EventKind::TwitchMessage,
    EventKind::TwitchUser,
    EventKind::SearchResult,
];

impl ChatCommands {
    pub fn new(bus: EventBus, config: &ChatConfig) -> Self {
        Self {
            bus,
            router: ChatRouter::new(config),
            handler: Mutex::new(None),
        }
    }
}

impl Service for ChatCommands {
    fn name(&self) -> &str {
        "ChatCommands"
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        Some(self)
    }
}

#[async_trait]
impl Startable for ChatCommands {
    async fn start(&self) -> anyhow::Result<()> {
        let mut slot = self.handler.lock();
        if slot.is_some() {
            return Ok(());
        }

        let bus = self.bus.clone();
        let router = self.router.clone();
        let handler = async_handler(move |event| {
            let bus = bus.clone();
            let outgoing = router.route(&event);
            async move {
                for event in outgoing {
                    bus.publish(event).await;
                }
                Ok(())
            }
        });

        for kind in ROUTED_KINDS {
            self.bus.subscribe_async(kind, handler.clone());
        }
        *slot = Some(handler);
        Ok(())
    }
}

#[async_trait]
impl Stoppable for ChatCommands {
    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(handler) = self.handler.lock().take() {
            for kind in ROUTED_KINDS {
                self.bus.unsubscribe(kind, &handler);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::{sync_handler, SearchHit};
    use crate::services::WorkerPool;
    use std::sync::Arc;

    fn router() -> ChatRouter {
        ChatRouter::new(&ChatConfig::default())
    }

    fn chat(user: &str, message: &str) -> TwitchMessage {
        TwitchMessage {
            username: user.to_string(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(Event::kind).collect()
    }

    #[test]
    fn test_shoutout_strips_at_sign() {
        let events = router().on_message(&chat("viewer", "!SO @coolstreamer"));
        assert_eq!(kinds(&events), vec![EventKind::UiLog, EventKind::SpeakRequest]);
        match &events[1] {
            Event::SpeakRequest(req) => assert!(req.text.starts_with("Go check out coolstreamer")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_commands_without_arguments_prompt_the_user() {
        for command in ["!shoutout", "!search", "!ask", "!penny"] {
            let events = router().on_message(&chat("viewer", command));
            assert_eq!(kinds(&events), vec![EventKind::SpeakRequest], "{command}");
            match &events[0] {
                Event::SpeakRequest(req) => assert!(req.text.contains("viewer")),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_search_keeps_quoted_words_and_user() {
        let events = router().on_message(&chat("viewer", r#"!search "rust async" runtimes"#));
        assert_eq!(kinds(&events), vec![EventKind::UiLog, EventKind::SearchRequest]);
        match &events[1] {
            Event::SearchRequest(req) => {
                assert_eq!(req.query, "rust async runtimes");
                assert_eq!(req.source, SEARCH_SOURCE_CHAT);
                assert_eq!(req.original_user.as_deref(), Some("viewer"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ask_builds_ai_query() {
        let events = router().on_message(&chat("viewer", "!ask what is a borrow checker"));
        match events.as_slice() {
            [Event::AiQuery(query)] => {
                assert_eq!(query.input_text, "what is a borrow checker");
                assert_eq!(query.instruction.as_deref(), Some("User viewer asked: "));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unparsable_and_unknown_commands_are_ignored() {
        assert!(router().on_message(&chat("viewer", "!search \"unterminated")).is_empty());
        assert!(router().on_message(&chat("viewer", "!dance")).is_empty());
        assert!(router().on_message(&chat("viewer", "just chatting")).is_empty());
    }

    #[test]
    fn test_bot_mention_is_case_insensitive() {
        let events = router().on_message(&chat("viewer", "hey @Penny how are you"));
        assert_eq!(kinds(&events), vec![EventKind::UiLog, EventKind::AiQuery]);
        match &events[1] {
            Event::AiQuery(query) => assert_eq!(query.source.as_deref(), Some(AI_SOURCE_CHAT)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_platform_event_asks_for_reaction() {
        let mut event = TwitchUser {
            event_type: "raid".to_string(),
            username: "friend".to_string(),
            ..Default::default()
        };
        event.details.insert("viewers".to_string(), "42".to_string());

        match router().on_platform_event(&event).as_slice() {
            [Event::AiQuery(query)] => {
                assert_eq!(query.input_text, "raid from friend, viewers: 42");
                assert_eq!(query.source.as_deref(), Some(AI_SOURCE_EVENT));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_search_results_from_chat_only() {
        let mut result = SearchResult {
            query: "ferris".to_string(),
            source: "voice".to_string(),
            ..Default::default()
        };
        assert!(router().on_search_result(&result).is_empty());

        result.source = SEARCH_SOURCE_CHAT.to_string();
        result.original_user = Some("viewer".to_string());
        match router().on_search_result(&result).as_slice() {
            [Event::SpeakRequest(req)] => {
                assert_eq!(req.text, "Sorry viewer, I couldn't find anything about ferris.")
            }
            other => panic!("unexpected {other:?}"),
        }

        result.results.push(SearchHit {
            title: "Ferris the crab".to_string(),
            snippet: "Mascot of Rust".to_string(),
            url: "https://rustacean.net".to_string(),
        });
        match router().on_search_result(&result).as_slice() {
            [Event::AiQuery(query)] => {
                assert_eq!(query.input_text, "Mascot of Rust");
                assert!(query.instruction.as_deref().unwrap_or_default().contains("Ferris the crab"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_service_publishes_routed_events() {
        let bus = EventBus::new(WorkerPool::new(1));
        let service = ChatCommands::new(bus.clone(), &ChatConfig::default());

        let spoken = Arc::new(Mutex::new(Vec::new()));
        let sink = spoken.clone();
        bus.subscribe(
            EventKind::SpeakRequest,
            sync_handler(move |event| {
                if let Event::SpeakRequest(req) = event {
                    sink.lock().push(req.text.clone());
                }
                Ok(())
            }),
        );

        service.start().await.expect("start");
        bus.publish(chat("viewer", "!so streamer")).await;
        assert_eq!(spoken.lock().len(), 1);

        service.stop().await.expect("stop");
        for kind in ROUTED_KINDS {
            assert_eq!(bus.subscriber_count(kind), 0);
        }
        bus.publish(chat("viewer", "!so streamer")).await;
        assert_eq!(spoken.lock().len(), 1);
    }
}
