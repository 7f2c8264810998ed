//! The agent loop: model turn, one tool execution, observation, repeat.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use webrover_core::config::{BrowserConfig, RedactBy};
use webrover_core::types::{ChatMessage, LLMResponse, TokenUsage, ToolCallRequest, ToolChoice};
use webrover_core::{Config, Error, Paths, Result};
use webrover_providers::Provider;
use webrover_storage::TranscriptStore;
use webrover_tools::browser::{
    scrape, ElementRole, IndexLimits, IndexedElement, NavigateOutcome, NavigationWatcher, PageDriver, Settlement,
};
use webrover_tools::catalog::MAKE_PLAN;
use webrover_tools::{all_schemas, distill_with_limits, schemas, ToolCall, TypeEntry};

use crate::context::{task_message, SYSTEM_PROMPT};
use crate::conversation::{Conversation, Message};
use crate::cost;
use crate::observation::{self, Observation};
use crate::operator::Operator;
use crate::state::SessionState;

/// Error text Chrome reports when a navigation turned into a download.
const DOWNLOAD_ABORT: &str = "net::ERR_ABORTED";

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub model: String,
    pub llm_max_retries: u32,
    pub llm_retry_delay_ms: u64,
    pub context_length_limit: usize,
    pub content_char_limit: usize,
    pub max_model_turns: u32,
    pub redact_by: RedactBy,
    pub read_file_max_bytes: usize,
    /// Base for relative `read_file` paths.
    pub workspace: PathBuf,
    pub browser: BrowserConfig,
}

impl RuntimeSettings {
    pub fn from_config(config: &Config, paths: &Paths) -> Self {
        let defaults = &config.agents.defaults;
        Self {
            model: defaults.model.clone(),
            llm_max_retries: defaults.llm_max_retries,
            llm_retry_delay_ms: defaults.llm_retry_delay_ms,
            context_length_limit: defaults.context_length_limit,
            content_char_limit: defaults.content_char_limit,
            max_model_turns: defaults.max_model_turns,
            redact_by: defaults.redact_by,
            read_file_max_bytes: config.tools.read_file_max_bytes,
            workspace: paths.workspace(),
            browser: config.browser.clone(),
        }
    }
}

/// Where the loop is between two steps.
#[derive(Debug)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTool(ToolCallRequest),
    ObservationReady {
        call: ToolCallRequest,
        observation: Observation,
    },
    /// Control is with the operator: an answer, plain model text, or a
    /// transport failure. `call` is the `answer_user` call when there is one.
    AwaitingOperator {
        call: Option<ToolCallRequest>,
        text: String,
    },
    Finished,
}

pub struct AgentRuntime {
    provider: Box<dyn Provider>,
    driver: Box<dyn PageDriver>,
    operator: Box<dyn Operator>,
    settings: RuntimeSettings,
    watcher: NavigationWatcher,
    limits: IndexLimits,
    conversation: Conversation,
    state: SessionState,
    /// `false` until the model produced its first response.
    planned: bool,
    transcripts: Option<(TranscriptStore, String)>,
    task: String,
}

impl AgentRuntime {
    pub fn new(
        provider: Box<dyn Provider>,
        driver: Box<dyn PageDriver>,
        operator: Box<dyn Operator>,
        settings: RuntimeSettings,
    ) -> Self {
        let watcher = NavigationWatcher::from_config(&settings.browser);
        let limits = IndexLimits::from(&settings.browser);
        let conversation = Conversation::new(settings.context_length_limit);
        Self {
            provider,
            driver,
            operator,
            settings,
            watcher,
            limits,
            conversation,
            state: SessionState::new(),
            planned: false,
            transcripts: None,
            task: String::new(),
        }
    }

    /// Write the full conversation to a transcript after every step.
    pub fn with_transcripts(mut self, store: TranscriptStore) -> Self {
        let id = TranscriptStore::new_transcript_id();
        info!(transcript_id = %id, "Debug transcripts enabled");
        self.transcripts = Some((store, id));
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transcript_id(&self) -> Option<&str> {
        self.transcripts.as_ref().map(|(_, id)| id.as_str())
    }

    /// Run tasks until the operator ends the session. The browser is closed
    /// on the way out.
    pub async fn run(&mut self, task: Option<String>) -> Result<()> {
        let result = self.run_session(task).await;
        if let Err(e) = self.driver.close().await {
            warn!(error = %e, "Failed to close the browser");
        }
        result
    }

    async fn run_session(&mut self, task: Option<String>) -> Result<()> {
        let task = match task {
            Some(task) => task,
            None => match self.operator.ask_task().await? {
                Some(task) => task,
                None => return Ok(()),
            },
        };

        self.state.current_url = self.driver.current_url().await.unwrap_or_default();
        self.begin(&task);

        let mut step = LoopState::AwaitingModel;
        loop {
            step = match step {
                LoopState::AwaitingModel => self.await_model().await?,
                LoopState::ExecutingTool(call) => self.execute_tool(call).await,
                LoopState::ObservationReady { call, observation } => {
                    self.conversation.append(Message::observation(
                        &call,
                        observation,
                        &self.state.current_url,
                        self.state.page_generation,
                    ));
                    LoopState::AwaitingModel
                }
                LoopState::AwaitingOperator { call, text } => self.hand_to_operator(call, &text).await?,
                LoopState::Finished => break,
            };
            self.save_transcript();
        }

        info!(
            prompt_tokens = self.state.usage.prompt_tokens,
            completion_tokens = self.state.usage.completion_tokens,
            "Session finished"
        );
        Ok(())
    }

    fn begin(&mut self, task: &str) {
        info!(task = %task, model = %self.settings.model, "Starting task");
        self.task = task.to_string();
        self.conversation = Conversation::new(self.settings.context_length_limit);
        self.conversation.append(Message::system(SYSTEM_PROMPT));
        self.conversation.append(Message::user(&task_message(task)));
        self.state.start_task();
        self.planned = false;
    }

    async fn await_model(&mut self) -> Result<LoopState> {
        if self.state.model_turns >= self.settings.max_model_turns {
            warn!(turns = self.state.model_turns, "Model turn limit reached");
            return Ok(LoopState::AwaitingOperator {
                call: None,
                text: format!(
                    "I have taken {} steps on this task without finishing it. What should I do next?",
                    self.state.model_turns
                ),
            });
        }

        let (tools, choice) = if self.planned {
            (all_schemas(), ToolChoice::Auto)
        } else {
            (schemas(&[MAKE_PLAN]), ToolChoice::Required)
        };
        let messages = self.conversation.snapshot(self.settings.redact_by);
        debug!(
            messages = messages.len(),
            estimated_tokens = self.conversation.estimated_tokens(self.settings.redact_by),
            tools = tools.len(),
            "Requesting model turn"
        );

        let response = match self.chat_with_retry(&messages, &tools, choice).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Model call failed after all retries");
                return Ok(LoopState::AwaitingOperator {
                    call: None,
                    text: format!("There was an error with the language model: {}", e),
                });
            }
        };

        self.planned = true;
        self.state.model_turns += 1;
        self.record_usage(&response.usage).await?;

        info!(
            content_len = response.content.as_ref().map(|c| c.len()).unwrap_or(0),
            tool_calls_count = response.tool_calls.len(),
            finish_reason = %response.finish_reason,
            "LLM response received"
        );

        let LLMResponse { content, tool_calls, .. } = response;
        if tool_calls.len() > 1 {
            warn!(dropped = tool_calls.len() - 1, "Only the first tool call is executed");
        }
        match tool_calls.into_iter().next() {
            Some(call) => {
                self.conversation
                    .append(Message::assistant(content.as_deref(), vec![call.clone()]));
                Ok(LoopState::ExecutingTool(call))
            }
            None => {
                let text = content.unwrap_or_default();
                self.conversation.append(Message::assistant(Some(&text), vec![]));
                Ok(LoopState::AwaitingOperator { call: None, text })
            }
        }
    }

    async fn chat_with_retry(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        choice: ToolChoice,
    ) -> Result<LLMResponse> {
        let max_retries = self.settings.llm_max_retries;
        let base_delay_ms = self.settings.llm_retry_delay_ms;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay_ms = retry_delay_ms(base_delay_ms, attempt);
                warn!(attempt, max_retries, delay_ms, "Retrying LLM call after error");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            match self.provider.chat(messages, tools, choice).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!(attempt, "LLM call succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(error = %e, attempt, max_retries, "LLM call failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Provider("no attempt was made".to_string())))
    }

    async fn record_usage(&mut self, usage: &TokenUsage) -> Result<()> {
        self.state.usage.add(usage);
        if let Some(line) = cost::call_cost_line(usage, &self.settings.model) {
            self.operator.notice(&line).await?;
        }
        self.operator.usage(usage).await
    }

    async fn execute_tool(&mut self, call: ToolCallRequest) -> LoopState {
        let decoded = ToolCall::decode(&call.name, &call.arguments);
        info!(tool = %call.name, call_id = %call.id, "Executing tool");

        if let ToolCall::AnswerUser { answer } = &decoded {
            let text = observation::render_answer(answer, &self.state.current_url);
            return LoopState::AwaitingOperator { call: Some(call), text };
        }

        let observation = match self.dispatch(decoded).await {
            Ok(observation) => observation,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                observation::command_error()
            }
        };
        LoopState::ObservationReady { call, observation }
    }

    async fn hand_to_operator(&mut self, call: Option<ToolCallRequest>, text: &str) -> Result<LoopState> {
        let cost_line = cost::current_cost_line(&self.state.usage, &self.settings.model);
        self.operator.notice(&cost_line).await?;

        if let Some(call) = &call {
            self.conversation.append(Message::observation(
                call,
                observation::answer_delivered(),
                &self.state.current_url,
                self.state.page_generation,
            ));
        }

        match self.operator.respond(text).await? {
            Some(reply) => {
                self.conversation.append(Message::user(&reply));
                self.state.start_task();
                Ok(LoopState::AwaitingModel)
            }
            None => Ok(LoopState::Finished),
        }
    }

    async fn dispatch(&mut self, call: ToolCall) -> Result<Observation> {
        match call {
            ToolCall::MakePlan { plan } => {
                self.progress(&format!("Plan: {}", plan.trim())).await;
                Ok(observation::plan_acknowledged())
            }
            ToolCall::ReadFile { path } => self.read_file(&path).await,
            ToolCall::GotoUrl { url } => self.goto(&url).await,
            ToolCall::ListLinks => {
                self.progress("Listing links").await;
                self.state.links = self.scrape(ElementRole::Links).await?;
                Ok(observation::links_listed(&self.state.links))
            }
            ToolCall::ListInputs => {
                self.progress("Listing inputs").await;
                self.state.inputs = self.scrape(ElementRole::Inputs).await?;
                Ok(observation::inputs_listed(&self.state.inputs))
            }
            ToolCall::ClickLink { link_id } => self.click_link(link_id).await,
            ToolCall::TypeText { entries, submit } => self.type_text(&entries, submit).await,
            ToolCall::SendForm => self.send_form().await,
            ToolCall::GetContent => self.get_content().await,
            ToolCall::AnswerUser { .. } => Ok(observation::answer_delivered()),
            ToolCall::Unknown { name } => {
                warn!(tool = %name, "Model called an unknown function");
                Ok(observation::unknown_function())
            }
            ToolCall::Invalid { name, reason } => {
                warn!(tool = %name, reason = %reason, "Tool arguments rejected");
                Ok(observation::invalid_arguments(&name, &reason))
            }
        }
    }

    async fn progress(&mut self, line: &str) {
        if let Err(e) = self.operator.progress(line).await {
            debug!(error = %e, "Could not report progress");
        }
    }

    async fn scrape(&mut self, role: ElementRole) -> Result<Vec<IndexedElement>> {
        scrape(
            self.driver.as_mut(),
            role,
            self.settings.browser.focus_strategy,
            self.limits,
        )
        .await
    }

    async fn read_file(&mut self, path: &str) -> Result<Observation> {
        self.progress(&format!("Reading file {}", path)).await;

        if !self.operator.unattended() {
            let question = format!("The agent wants to read the file {}. Allow?", path);
            if !self.operator.confirm(&question).await? {
                info!(path = %path, "File read denied by operator");
                return Ok(observation::file_not_permitted(path));
            }
        }

        let read = webrover_tools::fs::read_text_file(
            path,
            &self.settings.workspace,
            self.settings.read_file_max_bytes,
        )
        .await;
        match read {
            Ok(content) => {
                let budget = self
                    .settings
                    .context_length_limit
                    .saturating_sub(observation::file_contents_overhead(path));
                let content: String = content.chars().take(budget).collect();
                Ok(observation::file_contents(path, &content))
            }
            Err(Error::NotFound(_)) => Ok(observation::file_missing(path)),
            Err(Error::PermissionDenied(reason)) => {
                info!(path = %path, reason = %reason, "File not readable");
                Ok(observation::file_not_permitted(path))
            }
            Err(e) => Err(e),
        }
    }

    async fn goto(&mut self, url: &str) -> Result<Observation> {
        self.progress(&format!("Going to {}", url)).await;

        self.watcher
            .arm(self.driver.as_mut(), &mut self.state.lifecycle)
            .await?;
        match self.driver.navigate(url).await? {
            NavigateOutcome::Started => {}
            NavigateOutcome::Aborted(error) if error.contains(DOWNLOAD_ABORT) => {
                return Ok(observation::download_notice());
            }
            NavigateOutcome::Aborted(error) => return Ok(observation::navigation_failed(url, &error)),
        }

        let settlement = self
            .watcher
            .settle(self.driver.as_mut(), &mut self.state.lifecycle)
            .await?;
        if settlement == Settlement::Download {
            return Ok(observation::download_notice());
        }

        let current = self.driver.current_url().await?;
        self.state.record_navigation(&current);
        self.state.links = match self.scrape(ElementRole::Links).await {
            Ok(links) => links,
            Err(e) => {
                warn!(url = %current, error = %e, "Link scrape after navigation failed");
                Vec::new()
            }
        };
        info!(url = %current, links = self.state.links.len(), settled = settlement.is_settled(), "Navigated");

        if settlement.is_settled() {
            Ok(observation::arrived(&current, &self.state.links))
        } else {
            Ok(Observation::join(vec![
                observation::no_navigation(&current),
                observation::links_listed(&self.state.links),
            ]))
        }
    }

    async fn click_link(&mut self, link_id: u32) -> Result<Observation> {
        let Some(link) = self.state.link(link_id).cloned() else {
            info!(link_id, "Link id not in the latest scrape");
            return self.not_clickable(link_id, "").await;
        };

        self.progress(&format!("Clicking link \"{}\"", link.text)).await;
        self.watcher
            .arm(self.driver.as_mut(), &mut self.state.lifecycle)
            .await?;
        if let Err(e) = self.driver.click(&link.handle).await {
            warn!(link_id, error = %e, "Click failed");
            return self.not_clickable(link_id, &link.text).await;
        }

        let settlement = self
            .watcher
            .settle(self.driver.as_mut(), &mut self.state.lifecycle)
            .await?;
        self.after_transition(settlement, observation::clicked).await
    }

    /// Re-scrape links so the model gets a list it can actually use.
    async fn not_clickable(&mut self, link_id: u32, link_text: &str) -> Result<Observation> {
        self.state.links = self.scrape(ElementRole::Links).await?;
        Ok(observation::not_clickable(link_id, link_text, &self.state.links))
    }

    async fn type_text(&mut self, entries: &[TypeEntry], submit: bool) -> Result<Observation> {
        let mut parts = Vec::with_capacity(entries.len() + 1);
        let mut failed = false;

        for entry in entries {
            let Some(input) = self.state.input(entry.input_id).cloned() else {
                info!(input_id = entry.input_id, "Input id not in the latest scrape");
                parts.push(observation::command_error());
                failed = true;
                break;
            };

            self.progress(&format!(
                "Typing {} to an input field",
                Value::String(entry.text.clone())
            ))
            .await;
            match self.driver.type_into(&input.handle, &entry.text).await {
                Ok(()) => {
                    self.state.last_typed = Some(input.handle.clone());
                    parts.push(observation::typed(&entry.text, entry.input_id));
                }
                Err(e) => {
                    warn!(input_id = entry.input_id, error = %e, "Typing failed");
                    parts.push(observation::command_error());
                    failed = true;
                    break;
                }
            }
        }

        if submit && !failed {
            parts.push(self.send_form().await?);
        }
        Ok(Observation::join(parts))
    }

    async fn send_form(&mut self) -> Result<Observation> {
        let Some(handle) = self.state.last_typed.clone() else {
            info!("No input was typed into, nothing to submit");
            return Ok(observation::form_not_sent());
        };

        self.progress("Submitting form").await;
        self.watcher
            .arm(self.driver.as_mut(), &mut self.state.lifecycle)
            .await?;
        if let Err(e) = self.driver.submit_form(&handle).await {
            warn!(error = %e, "Form submission failed");
            return Ok(observation::form_not_sent());
        }

        let settlement = self
            .watcher
            .settle(self.driver.as_mut(), &mut self.state.lifecycle)
            .await?;
        self.after_transition(settlement, observation::form_sent).await
    }

    /// Observation for an action that may have started a navigation.
    async fn after_transition(
        &mut self,
        settlement: Settlement,
        arrived: fn(&str) -> Observation,
    ) -> Result<Observation> {
        match settlement {
            Settlement::Download => Ok(observation::download_notice()),
            Settlement::Loaded => {
                let url = self.driver.current_url().await?;
                self.state.record_navigation(&url);
                info!(url = %url, "Navigated");
                Ok(arrived(&url))
            }
            Settlement::TimedOut => {
                let url = self.driver.current_url().await?;
                self.state.current_url = url.clone();
                Ok(observation::no_navigation(&url))
            }
        }
    }

    async fn get_content(&mut self) -> Result<Observation> {
        self.progress("Getting page content").await;
        let html = self.driver.body_html().await?;
        let distilled = distill_with_limits(&html, self.limits.text_limit, self.limits.attr_limit);

        let budget = self
            .settings
            .content_char_limit
            .min(self.settings.context_length_limit.saturating_sub(observation::page_content_overhead()));
        let content: String = distilled.chars().take(budget).collect();
        debug!(
            distilled_chars = distilled.chars().count(),
            sent_chars = content.chars().count(),
            "Page content distilled"
        );
        Ok(observation::page_content(&content))
    }

    fn save_transcript(&self) {
        let Some((store, id)) = &self.transcripts else {
            return;
        };
        let usage = serde_json::to_value(self.state.usage).unwrap_or(Value::Null);
        if let Err(e) = store.save(
            id,
            &self.settings.model,
            &self.task,
            usage,
            &self.conversation.full_history(),
        ) {
            warn!(error = %e, transcript_id = %id, "Failed to save transcript");
        }
    }
}

/// Backoff before retry `attempt` (1-based): doubles up to 16x the base.
fn retry_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(4))
}
