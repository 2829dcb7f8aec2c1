//! Agent implementation - orchestrates the LLM <-> execution-session loop
//!
//! One query runs a bounded number of turns. Each turn streams a completion,
//! segments it incrementally, executes every code fragment against the
//! persistent session, and feeds the execution output back to the model. A
//! turn that produces no code fragment is the model's final answer.

use crate::prompt;
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider, StreamChunk};
use codeact_engine::error::{Error, Result};
use codeact_engine::{ExecutionSession, Segment, SegmentKind, StreamSegmenter};

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Enable verbose logging
    pub verbose: bool,
    /// Override the provider's default model
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Upper bound on completion turns per query
    pub max_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            verbose: true,
            model: None,
            temperature: Some(0.25),
            top_p: Some(0.9),
            max_turns: 8,
        }
    }
}

/// The code-act orchestrator
pub struct CodeActAgent<P: LlmProvider> {
    provider: P,
    session: ExecutionSession,
    config: AgentConfig,
    /// Full chat history, including system prompt and tool feedback
    history: Vec<ChatMessage>,
    /// Instructions appended to the system prompt
    extra_instructions: Vec<String>,
}

impl<P: LlmProvider> CodeActAgent<P> {
    /// Create a new agent with default configuration
    pub fn new(provider: P, session: ExecutionSession) -> Self {
        Self::with_config(provider, session, AgentConfig::default())
    }

    /// Create a new agent with custom configuration
    pub fn with_config(provider: P, session: ExecutionSession, config: AgentConfig) -> Self {
        Self {
            provider,
            session,
            config,
            history: Vec::new(),
            extra_instructions: Vec::new(),
        }
    }

    /// Append instructions to the system prompt for subsequent queries
    pub fn give_instructions(&mut self, instructions: impl Into<String>) {
        self.extra_instructions.push(instructions.into());
        // an already-started conversation gets the update too
        if let Some(first) = self.history.first_mut() {
            first.content = prompt::system_prompt(&self.extra_instructions);
        }
    }

    /// Forget the conversation. Session bindings are untouched; rebuild the
    /// agent with a fresh session for a full restart.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// The execution session backing this agent
    pub fn session(&self) -> &ExecutionSession {
        &self.session
    }

    /// Chat history accumulated so far
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Run one query to completion and return the ordered segment transcript.
    pub async fn run(&mut self, query: &str) -> Result<Vec<Segment>> {
        if self.history.is_empty() {
            self.history.push(ChatMessage::system(prompt::system_prompt(
                &self.extra_instructions,
            )));
        }
        self.history.push(ChatMessage::user(query));

        if self.config.verbose {
            println!("Query: {}\n", query);
        }

        let mut transcript = Vec::new();
        for turn in 0..self.config.max_turns {
            if self.config.verbose {
                println!("-- turn {} --", turn + 1);
            }

            let (segments, executed) = self.take_turn().await?;
            transcript.extend(segments);

            // no code this turn means the model gave its final answer
            if !executed {
                break;
            }
        }

        Ok(transcript)
    }

    /// Stream one completion, executing code fragments as they complete.
    /// Returns the turn's segments and whether any code was executed.
    async fn take_turn(&mut self) -> Result<(Vec<Segment>, bool)> {
        let mut request = CompletionRequest::new(self.history.clone()).with_streaming(true);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(top_p) = self.config.top_p {
            request = request.with_top_p(top_p);
        }

        let mut receiver = self
            .provider
            .stream(request)
            .await
            .map_err(|e| Error::from(e).with_operation("agent::take_turn"))?;

        let mut segmenter = StreamSegmenter::new();
        let mut raw = String::new();
        let mut segments = Vec::new();
        let mut tool_feedback = Vec::new();
        let mut executed = false;

        while let Some(chunk) = receiver.next_chunk().await {
            match chunk {
                StreamChunk::Text(delta) => {
                    raw.push_str(&delta);
                    for segment in segmenter.feed(&delta) {
                        self.handle_segment(
                            segment,
                            &mut segmenter,
                            &mut segments,
                            &mut tool_feedback,
                            &mut executed,
                        );
                    }
                }
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => {
                    return Err(Error::inference_failed(e).with_operation("agent::take_turn"));
                }
            }
        }

        for segment in segmenter.flush() {
            if self.config.verbose {
                print_segment(&segment);
            }
            segments.push(segment);
        }

        self.history.push(ChatMessage::assistant(raw));
        for feedback in tool_feedback {
            self.history.push(ChatMessage::user(feedback));
        }

        Ok((segments, executed))
    }

    /// Append one emitted segment; a code segment is executed on the spot and
    /// its tool output follows it in the transcript and the chat history.
    fn handle_segment(
        &mut self,
        segment: Segment,
        segmenter: &mut StreamSegmenter,
        segments: &mut Vec<Segment>,
        tool_feedback: &mut Vec<String>,
        executed: &mut bool,
    ) {
        let is_code = segment.kind == SegmentKind::Code;
        let code = segment.content.clone();

        if self.config.verbose {
            print_segment(&segment);
        }
        segments.push(segment);

        if !is_code {
            return;
        }
        *executed = true;

        let outcome = self.session.execute(&code);
        if self.config.verbose {
            println!(
                "   [exec] {}",
                if outcome.succeeded { "ok" } else { "failed" }
            );
        }

        let output = outcome.tool_output();
        for emitted in segmenter.flush_for_tool_result(&output) {
            if self.config.verbose {
                print_segment(&emitted);
            }
            segments.push(emitted);
        }

        // the model sees execution output as the next user message; the
        // OpenAI tool role is tied to function-call ids this loop never uses
        tool_feedback.push(format!("Execution output:\n{}", output));
    }
}

fn print_segment(segment: &Segment) {
    let prefix = match segment.kind {
        SegmentKind::Text => "",
        SegmentKind::Code => ">>> ",
        SegmentKind::Tool => "=== ",
    };
    for line in segment.content.lines() {
        println!("{}{}", prefix, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        CompletionResponse, FinishReason, ProviderError, StreamReceiver, Usage,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Snippet execution redirects process-global stdio; keep executing
    /// tests serialized.
    static PY_LOCK: Mutex<()> = Mutex::new(());

    /// Provider that replays canned responses, streamed in small slices to
    /// exercise marker splitting.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            }
        }

        fn next_response(&self) -> String {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted")
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                id: "scripted".into(),
                model: "test-model".into(),
                content: Some(self.next_response()),
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
            })
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<StreamReceiver, ProviderError> {
            let response = self.next_response();
            Ok(StreamReceiver::new(async_stream::stream! {
                let chars: Vec<char> = response.chars().collect();
                for slice in chars.chunks(3) {
                    yield StreamChunk::Text(slice.iter().collect());
                }
                yield StreamChunk::Done { finish_reason: FinishReason::Stop, usage: None };
            }))
        }
    }

    fn quiet() -> AgentConfig {
        AgentConfig {
            verbose: false,
            ..AgentConfig::default()
        }
    }

    fn session() -> ExecutionSession {
        ExecutionSession::builder().build().unwrap()
    }

    #[tokio::test]
    async fn test_code_turn_then_answer() {
        let _guard = PY_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let provider = ScriptedProvider::new(&[
            "Let me compute. <execute>6 * 7</execute>",
            "The answer is 42.",
        ]);
        let mut agent = CodeActAgent::with_config(provider, session(), quiet());

        let transcript = agent.run("what is 6 * 7?").await.unwrap();

        let kinds: Vec<SegmentKind> = transcript.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Text,
                SegmentKind::Code,
                SegmentKind::Tool,
                SegmentKind::Text,
            ]
        );
        assert_eq!(transcript[1].content, "6 * 7");
        assert_eq!(transcript[2].content, "42");
        assert_eq!(transcript[3].content, "The answer is 42.");

        // tool output was fed back into the chat history
        assert!(agent
            .history()
            .iter()
            .any(|m| m.role == crate::provider::Role::User && m.content.contains("42")));
    }

    #[tokio::test]
    async fn test_plain_answer_is_one_turn() {
        let provider = ScriptedProvider::new(&["Paris is the capital of France."]);
        let mut agent = CodeActAgent::with_config(provider, session(), quiet());

        let transcript = agent.run("capital of France?").await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].kind, SegmentKind::Text);
        // system + user + assistant, no tool feedback
        assert_eq!(agent.history().len(), 3);
    }

    #[tokio::test]
    async fn test_turn_budget_bounds_the_loop() {
        let _guard = PY_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let script = "<execute>1 + 1</execute>";
        let provider = ScriptedProvider::new(&[script; 5]);
        let mut agent = CodeActAgent::with_config(
            provider,
            session(),
            AgentConfig {
                verbose: false,
                max_turns: 2,
                ..AgentConfig::default()
            },
        );

        let transcript = agent.run("loop forever").await.unwrap();
        let code_count = transcript
            .iter()
            .filter(|s| s.kind == SegmentKind::Code)
            .count();
        assert_eq!(code_count, 2);
    }

    #[tokio::test]
    async fn test_session_state_survives_across_queries() {
        let _guard = PY_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let provider = ScriptedProvider::new(&[
            "<execute>total = 40</execute>",
            "Stored.",
            "<execute>total + 2</execute>",
            "It is 42.",
        ]);
        let mut agent = CodeActAgent::with_config(provider, session(), quiet());

        agent.run("store 40").await.unwrap();
        let transcript = agent.run("add 2").await.unwrap();

        let tool = transcript
            .iter()
            .find(|s| s.kind == SegmentKind::Tool)
            .unwrap();
        assert_eq!(tool.content, "42");
    }

    #[test]
    fn test_give_instructions_updates_started_conversation() {
        let provider = ScriptedProvider::new(&[]);
        let mut agent = CodeActAgent::with_config(provider, session(), quiet());
        agent
            .history
            .push(ChatMessage::system(prompt::system_prompt(&[])));

        agent.give_instructions("A file named data.csv was uploaded.");
        assert!(agent.history()[0].content.contains("data.csv"));
    }

    #[test]
    fn test_reset_clears_history() {
        let provider = ScriptedProvider::new(&[]);
        let mut agent = CodeActAgent::with_config(provider, session(), quiet());
        agent.history.push(ChatMessage::user("hello"));

        agent.reset();
        assert!(agent.history().is_empty());
    }
}
